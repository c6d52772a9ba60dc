//! Address discovery for unexported linker routines.
//!
//! Bionic's public `dlopen` is a thin trampoline that forwards to the
//! internal `__loader_dlopen` with its own return address appended. The
//! first AArch64 `BL` instruction in the trampoline therefore names the
//! routine we need.
//!
//! The decoder is validated only against the arm64 bionic trampolines in
//! the tests below. A new platform release must be re-checked against
//! these fixtures before the signature is trusted.

/// Bits 31..26 of an AArch64 `BL imm26` instruction.
const BRANCH_LINK_OPCODE: u32 = 0b10_0101;

const IMM26_MASK: u32 = (1 << 26) - 1;

/// Width of one AArch64 instruction in bytes.
pub const INSTRUCTION_SIZE: usize = 4;

/// Returns the signed byte offset encoded by a `BL` instruction, or `None`
/// if `word` is some other instruction.
#[must_use]
pub const fn branch_link_offset(word: u32) -> Option<isize> {
    if word >> 26 != BRANCH_LINK_OPCODE {
        return None;
    }
    // Shift the 26-bit immediate to the top and arithmetic-shift back down
    // to sign-extend it, then scale by the instruction width.
    #[allow(clippy::cast_possible_wrap)]
    let imm = (((word & IMM26_MASK) << 6) as i32) >> 6;
    Some(imm as isize * INSTRUCTION_SIZE as isize)
}

/// Returns the absolute target of the `BL` at `pc`, if `word` is one.
#[must_use]
pub const fn branch_link_target(pc: usize, word: u32) -> Option<usize> {
    match branch_link_offset(word) {
        Some(offset) => Some(pc.wrapping_add_signed(offset)),
        None => None,
    }
}

/// Scans `words`, which start at address `base`, and returns the target of
/// the first branch-with-link instruction.
pub fn find_branch_link<I>(words: I, base: usize) -> Option<usize>
where
    I: IntoIterator<Item = u32>,
{
    words
        .into_iter()
        .enumerate()
        .find_map(|(index, word)| branch_link_target(base + index * INSTRUCTION_SIZE, word))
}

/// Scans at most `limit` instruction words of live code starting at `entry`.
///
/// Words are read one at a time, so nothing past the first match is touched.
///
/// # Safety
///
/// `entry` must be the 4-byte aligned start of mapped, readable code that
/// extends either to a `BL` instruction or for `limit` words.
pub unsafe fn scan_code(entry: *const u32, limit: usize) -> Option<usize> {
    let words = (0..limit).map(|index| {
        // SAFETY: guaranteed readable up to the first match by the caller.
        unsafe { entry.add(index).read() }
    });
    find_branch_link(words, entry as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `dlopen` from an arm64 bionic build with pointer authentication.
    const DLOPEN_PAC: [u32; 8] = [
        0xD503_233F, // paciasp
        0xA9BF_7BFD, // stp x29, x30, [sp, #-16]!
        0x9100_03FD, // mov x29, sp
        0xAA1E_03E2, // mov x2, x30
        0x9400_1234, // bl __loader_dlopen
        0xA8C1_7BFD, // ldp x29, x30, [sp], #16
        0xD503_23BF, // autiasp
        0xD65F_03C0, // ret
    ];

    /// `dlopen` from an older arm64 bionic build without pointer authentication.
    const DLOPEN_PLAIN: [u32; 6] = [
        0xA9BF_7BFD, // stp x29, x30, [sp, #-16]!
        0x9100_03FD, // mov x29, sp
        0xAA1E_03E2, // mov x2, x30
        0x97FF_FFF0, // bl -0x40
        0xA8C1_7BFD, // ldp x29, x30, [sp], #16
        0xD65F_03C0, // ret
    ];

    #[test]
    fn decodes_forward_branch() {
        assert_eq!(branch_link_offset(0x9400_0010), Some(0x40));
    }

    #[test]
    fn decodes_backward_branch() {
        assert_eq!(branch_link_offset(0x97FF_FFFF), Some(-4));
        assert_eq!(branch_link_offset(0x9600_0000), Some(-(1 << 27)));
    }

    #[test]
    fn rejects_plain_branch_and_ret() {
        assert_eq!(branch_link_offset(0x1400_0010), None);
        assert_eq!(branch_link_offset(0xD65F_03C0), None);
        assert_eq!(branch_link_offset(0xAA1E_03E2), None);
    }

    #[test]
    fn finds_internal_open_in_pac_trampoline() {
        let base = 0x7000_1000;
        let target = find_branch_link(DLOPEN_PAC, base).expect("bl present");
        assert_eq!(target, base + 4 * 4 + 0x1234 * 4);
    }

    #[test]
    fn finds_internal_open_in_plain_trampoline() {
        let base = 0x7000_2000;
        let target = find_branch_link(DLOPEN_PLAIN, base).expect("bl present");
        assert_eq!(target, base + 3 * 4 - 0x40);
    }

    #[test]
    fn first_match_wins() {
        let words = [0xD503_201F, 0x9400_0002, 0x9400_0100];
        assert_eq!(find_branch_link(words, 0x1000), Some(0x1000 + 4 + 8));
    }

    #[test]
    fn no_branch_link_yields_none() {
        let words = [0xD503_201F, 0xD65F_03C0];
        assert_eq!(find_branch_link(words, 0x1000), None);
    }

    #[test]
    fn scan_code_reads_live_words_up_to_limit() {
        let code = DLOPEN_PLAIN;
        let entry = code.as_ptr();
        // SAFETY: `code` is a live array of six words.
        let found = unsafe { scan_code(entry, code.len()) };
        assert_eq!(found, Some(entry as usize + 3 * 4 - 0x40));
        // SAFETY: three words are readable.
        assert_eq!(unsafe { scan_code(entry, 3) }, None);
    }
}
