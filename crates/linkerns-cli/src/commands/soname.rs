//! `lnsctl soname` — Print the soname of a shared library.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

/// Arguments for the `soname` command.
#[derive(Args, Debug)]
pub struct SonameArgs {
    /// Shared library to inspect.
    pub file: PathBuf,
}

/// Executes the `soname` command.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no soname.
pub fn execute(args: SonameArgs) -> anyhow::Result<()> {
    let data = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let soname = linkerns_elf::read_soname(&data)
        .with_context(|| format!("no soname in {}", args.file.display()))?;
    println!("{soname}");
    Ok(())
}
