//! Writing renamed copies of shared objects.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use linkerns_common::constants::IDENTITY_LEN;
use linkerns_common::error::{LinkerNsError, Result};
use linkerns_common::types::SonameIdentity;

use crate::error::ElfError;
use crate::image::ElfImage;

/// Overwrites the first bytes of the soname in `data` with `identity`.
///
/// Returns the original soname.
///
/// # Errors
///
/// Returns an error if `data` has no soname long enough to take the identity;
/// `data` is left untouched in that case.
pub fn patch_soname(
    data: &mut [u8],
    identity: SonameIdentity,
) -> std::result::Result<String, ElfError> {
    let range = ElfImage::parse(data)?.soname_range()?;
    let original = String::from_utf8_lossy(&data[range.clone()]).into_owned();
    if range.len() < IDENTITY_LEN {
        return Err(ElfError::SonameTooShort {
            soname: original,
            needed: IDENTITY_LEN,
        });
    }
    data[range.start..range.start + IDENTITY_LEN].copy_from_slice(identity.as_bytes());
    Ok(original)
}

/// Writes a copy of a library with a new embedded identity.
pub trait SonamePatcher: Send + Sync {
    /// Reads the library at `source`, rewrites its identity and writes the
    /// result to `destination`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or patched, or the
    /// destination cannot be written.
    fn patch(&self, source: &Path, destination: &File, identity: SonameIdentity) -> Result<()>;
}

/// [`SonamePatcher`] that patches the whole image in memory before writing.
///
/// Nothing is written to the destination unless patching succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfSonamePatcher;

impl SonamePatcher for ElfSonamePatcher {
    fn patch(&self, source: &Path, destination: &File, identity: SonameIdentity) -> Result<()> {
        let mut data = std::fs::read(source).map_err(|e| LinkerNsError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let original = patch_soname(&mut data, identity).map_err(|e| LinkerNsError::Patch {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let write_err = |e: std::io::Error| LinkerNsError::Patch {
            path: source.to_path_buf(),
            message: format!("writing patched copy: {e}"),
        };
        let mut out = destination;
        out.set_len(0).map_err(write_err)?;
        let _ = out.seek(SeekFrom::Start(0)).map_err(write_err)?;
        out.write_all(&data).map_err(write_err)?;
        out.flush().map_err(write_err)?;

        tracing::debug!(
            source = %source.display(),
            original,
            identity = %identity,
            bytes = data.len(),
            "wrote patched copy"
        );
        Ok(())
    }
}
