//! Errors raised while inspecting or patching a shared object.

use thiserror::Error;

/// Why a byte stream could not be read or patched as a shared object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElfError {
    /// The stream does not start with the ELF magic.
    #[error("not an ELF file")]
    NotElf,

    /// The ELF class byte is neither 32- nor 64-bit.
    #[error("unsupported ELF class {0}")]
    UnsupportedClass(u8),

    /// The object is not little-endian.
    #[error("unsupported ELF data encoding {0}")]
    UnsupportedEncoding(u8),

    /// The object failed structural parsing.
    #[error("malformed ELF file: {0}")]
    Malformed(String),

    /// A structure extends past the end of the file.
    #[error("truncated ELF file: {what} at offset {offset:#x}")]
    Truncated {
        /// Structure being read.
        what: &'static str,
        /// File offset of the read.
        offset: usize,
    },

    /// There is no `PT_DYNAMIC` segment.
    #[error("no dynamic segment")]
    NoDynamicSegment,

    /// The dynamic segment has no `DT_STRTAB` entry.
    #[error("no dynamic string table")]
    NoStringTable,

    /// The dynamic segment has no `DT_SONAME` entry.
    #[error("no DT_SONAME entry")]
    NoSoname,

    /// A virtual address lies outside every loadable segment.
    #[error("address {0:#x} is not backed by a loadable segment")]
    UnmappedAddress(u64),

    /// The soname string runs to the end of the file without a terminator.
    #[error("soname is not NUL-terminated")]
    Unterminated,

    /// The soname is too short to take the identity.
    #[error("soname {soname:?} is shorter than {needed} bytes")]
    SonameTooShort {
        /// The soname found in the file.
        soname: String,
        /// Bytes required.
        needed: usize,
    },
}
