//! `lnsctl patch` — Write a copy of a library under a new soname.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use linkerns_common::types::TargetId;
use linkerns_elf::{ElfSonamePatcher, SonamePatcher};

use crate::output;

/// Arguments for the `patch` command.
#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Library to copy.
    pub source: PathBuf,

    /// File to write the renamed copy to.
    pub destination: PathBuf,

    /// Counter value the new soname prefix is derived from.
    #[arg(long, default_value_t = 0)]
    pub id: u16,
}

/// Executes the `patch` command.
///
/// # Errors
///
/// Returns an error if the destination cannot be created or the source
/// cannot be patched.
pub fn execute(args: PatchArgs) -> anyhow::Result<()> {
    let written = patch_file(&args.source, &args.destination, TargetId::new(args.id))?;
    println!(
        "{} -> {} ({})",
        args.source.display(),
        args.destination.display(),
        output::format_bytes(written)
    );
    Ok(())
}

/// Writes a renamed copy of `source` to `destination` and returns its size.
///
/// # Errors
///
/// Returns an error if either file cannot be accessed or `source` is not a
/// patchable shared library.
pub fn patch_file(source: &Path, destination: &Path, id: TargetId) -> anyhow::Result<u64> {
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .with_context(|| format!("failed to open {}", destination.display()))?;
    ElfSonamePatcher.patch(source, &file, id.identity())?;
    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        identity = %id.identity(),
        "renamed copy written"
    );
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_elf_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("libtext.so");
        std::fs::write(&source, b"plain text").unwrap();
        let destination = dir.path().join("out.so");
        assert!(patch_file(&source, &destination, TargetId::new(3)).is_err());
        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 0);
    }

    #[test]
    fn missing_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = patch_file(
            &dir.path().join("absent.so"),
            &dir.path().join("out.so"),
            TargetId::new(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("absent.so"));
    }
}
