//! Domain primitive types used across the linkerns workspace.

use std::ffi::c_void;
use std::fmt;
use std::ops::BitOr;
use std::ptr::NonNull;

use crate::constants::{IDENTITY_LEN, PATCHED_SUFFIX};

/// Opaque handle to a linker namespace.
///
/// Namespaces are owned by the platform linker for the lifetime of the
/// process; this handle is only ever copied and passed back to the linker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceHandle(NonNull<c_void>);

// SAFETY: the pointee is linker-owned, never freed, and never dereferenced
// on the Rust side; the linker serializes access to it internally.
unsafe impl Send for NamespaceHandle {}
// SAFETY: see `Send` above.
unsafe impl Sync for NamespaceHandle {}

impl NamespaceHandle {
    /// Wraps a raw namespace pointer, returning `None` for null.
    #[must_use]
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Returns the raw pointer expected by the linker.
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Display for NamespaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// Opaque handle returned by the linker for a loaded library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(NonNull<c_void>);

// SAFETY: library handles are process-global tokens accepted by `dlsym`
// and `dlclose` from any thread.
unsafe impl Send for LibraryHandle {}
// SAFETY: see `Send` above.
unsafe impl Sync for LibraryHandle {}

impl LibraryHandle {
    /// Wraps a raw library handle, returning `None` for null.
    #[must_use]
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Returns the raw handle.
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Display for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.0)
    }
}

/// Caller-owned pointer handed to a hook library through its parameter slot.
///
/// The loader never dereferences it; it is only stored into the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookParam(NonNull<c_void>);

// SAFETY: the pointer is opaque to this workspace and only copied.
unsafe impl Send for HookParam {}
// SAFETY: see `Send` above.
unsafe impl Sync for HookParam {}

impl HookParam {
    /// Wraps a raw parameter pointer, returning `None` for null.
    #[must_use]
    pub fn from_raw(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr.cast_mut()).map(Self)
    }

    /// Builds a parameter from a reference that outlives the hook.
    #[must_use]
    pub fn from_static<T>(value: &'static T) -> Self {
        Self(NonNull::from(value).cast())
    }

    /// Returns the raw pointer written into the hook's slot.
    #[must_use]
    pub const fn as_ptr(self) -> *const c_void {
        self.0.as_ptr().cast_const()
    }
}

/// Namespace type flags accepted by namespace creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceType(u64);

impl NamespaceType {
    /// A regular namespace with no restrictions.
    pub const REGULAR: Self = Self(0);
    /// Libraries outside the search and permitted paths are rejected.
    pub const ISOLATED: Self = Self(1);
    /// The namespace starts with a copy of the parent's loaded libraries.
    pub const SHARED: Self = Self(2);
    /// Exempt-list enforcement for greylisted libraries.
    pub const EXEMPT_LIST_ENABLED: Self = Self(0x0800_0000);
    /// The namespace also serves as the anonymous namespace.
    pub const ALSO_USED_AS_ANONYMOUS: Self = Self(0x1000_0000);

    /// Wraps a raw flag word as passed across the C ABI.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw flag word.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for NamespaceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Per-attempt identifier drawn from the process-wide target counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u16);

impl TargetId {
    /// Creates an identifier from its raw counter value.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the identifier that follows this one, wrapping at `u16::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns the replacement soname prefix derived from this identifier.
    #[must_use]
    pub fn identity(self) -> SonameIdentity {
        SonameIdentity::from_target(self)
    }

    /// Returns the on-disk file name for the patched copy, e.g. `7_patched.so`.
    #[must_use]
    pub fn patched_file_name(self, extension: &str) -> String {
        format!("{}{PATCHED_SUFFIX}.{extension}", self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three decimal digits written over the start of a library's soname.
///
/// Derived from a [`TargetId`] modulo 1000, so it wraps back to `000`
/// after 1000 attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SonameIdentity([u8; IDENTITY_LEN]);

impl SonameIdentity {
    /// Derives the identity for a target id.
    #[must_use]
    pub fn from_target(id: TargetId) -> Self {
        let n = id.value() % 1000;
        #[allow(clippy::cast_possible_truncation)]
        let digit = |d: u16| b'0' + (d % 10) as u8;
        Self([digit(n / 100), digit(n / 10), digit(n)])
    }

    /// Parses an identity from exactly three bytes of text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let bytes: [u8; IDENTITY_LEN] = text.as_bytes().try_into().ok()?;
        bytes.iter().all(|b| *b != 0).then_some(Self(bytes))
    }

    /// Returns the raw bytes written into the soname.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Returns the identity as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII digits or validated UTF-8.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for SonameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identity_is_zero_padded() {
        assert_eq!(TargetId::new(0).identity().as_str(), "000");
        assert_eq!(TargetId::new(7).identity().as_str(), "007");
        assert_eq!(TargetId::new(42).identity().as_str(), "042");
        assert_eq!(TargetId::new(999).identity().as_str(), "999");
    }

    #[test]
    fn identity_wraps_after_one_thousand() {
        assert_eq!(TargetId::new(1000).identity().as_str(), "000");
        assert_eq!(TargetId::new(1001).identity().as_str(), "001");
        assert_eq!(TargetId::new(u16::MAX).identity().as_str(), "535");
    }

    #[test]
    fn first_thousand_identities_are_distinct() {
        let mut id = TargetId::default();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(id.identity()));
            id = id.next();
        }
        assert_eq!(id.identity().as_str(), "000");
    }

    #[test]
    fn target_id_wraps_at_u16_max() {
        assert_eq!(TargetId::new(u16::MAX).next(), TargetId::new(0));
    }

    #[test]
    fn patched_file_name_uses_full_counter() {
        assert_eq!(TargetId::new(0).patched_file_name("so"), "0_patched.so");
        assert_eq!(TargetId::new(1234).patched_file_name("so"), "1234_patched.so");
    }

    #[test]
    fn parse_identity_requires_three_bytes() {
        assert_eq!(SonameIdentity::parse("123").map(|i| i.to_string()), Some("123".into()));
        assert!(SonameIdentity::parse("12").is_none());
        assert!(SonameIdentity::parse("1234").is_none());
    }

    #[test]
    fn namespace_type_flags_combine() {
        let ty = NamespaceType::SHARED | NamespaceType::ISOLATED;
        assert_eq!(ty.bits(), 3);
        assert!(ty.contains(NamespaceType::SHARED));
        assert!(!NamespaceType::REGULAR.contains(NamespaceType::SHARED));
    }

    #[test]
    fn null_handles_are_rejected() {
        assert!(NamespaceHandle::from_raw(std::ptr::null_mut()).is_none());
        assert!(LibraryHandle::from_raw(std::ptr::null_mut()).is_none());
        assert!(HookParam::from_raw(std::ptr::null()).is_none());
    }

    #[test]
    fn hook_param_from_static_keeps_address() {
        static VALUE: u32 = 5;
        let param = HookParam::from_static(&VALUE);
        assert_eq!(param.as_ptr(), std::ptr::from_ref(&VALUE).cast());
    }
}
