//! Per-context source of unique target ids.

use linkerns_common::types::TargetId;

/// Monotonic counter handing out one [`TargetId`] per load attempt.
///
/// Starts at zero, is never reset, and wraps at `u16::MAX`.
#[derive(Debug, Default)]
pub struct TargetCounter {
    next: TargetId,
}

impl TargetCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: TargetId::new(0),
        }
    }

    /// Returns the id the next attempt will receive.
    #[must_use]
    pub const fn peek(&self) -> TargetId {
        self.next
    }

    /// Returns the current id and moves past it.
    pub const fn advance(&mut self) -> TargetId {
        let current = self.next;
        self.next = current.next();
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(TargetCounter::new().peek(), TargetId::new(0));
    }

    #[test]
    fn advance_returns_then_increments() {
        let mut counter = TargetCounter::new();
        assert_eq!(counter.advance(), TargetId::new(0));
        assert_eq!(counter.advance(), TargetId::new(1));
        assert_eq!(counter.peek(), TargetId::new(2));
    }

    #[test]
    fn peek_does_not_consume() {
        let counter = TargetCounter::new();
        assert_eq!(counter.peek(), counter.peek());
    }
}
