//! `lnsctl load` — Load a library into an isolated namespace.
//!
//! The load happens in this process, so it is only meaningful on a device;
//! elsewhere the command reports that the linker is unavailable.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use linkerns_common::config::LoaderConfig;
use linkerns_runtime::{LoadRequest, LoaderContext};
use serde::Serialize;

use crate::output;

/// When the linker resolves the loaded library's symbols.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Resolve every symbol at load time (`RTLD_NOW`).
    Now,
    /// Resolve symbols on first use (`RTLD_LAZY`).
    Lazy,
}

impl BindMode {
    const fn flags(self) -> libc::c_int {
        match self {
            Self::Now => libc::RTLD_NOW,
            Self::Lazy => libc::RTLD_LAZY,
        }
    }
}

/// Arguments for the `load` command.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Library to load.
    pub library: PathBuf,

    /// Directory for the renamed copy (memory-backed when omitted).
    #[arg(long)]
    pub target_dir: Option<PathBuf>,

    /// Directory containing the hook library.
    #[arg(long, requires = "hook")]
    pub hook_dir: Option<PathBuf>,

    /// Hook library to load alongside.
    #[arg(long, requires = "hook_dir")]
    pub hook: Option<String>,

    /// Exported namespace whose libraries stay visible.
    #[arg(long, default_value = "default")]
    pub parent: String,

    /// Also link the platform's default namespace.
    #[arg(long)]
    pub link_default: bool,

    /// Symbol binding mode.
    #[arg(long, value_enum, default_value_t = BindMode::Now)]
    pub mode: BindMode,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Outcome of a successful load.
#[derive(Debug, Serialize)]
pub struct LoadReport {
    /// Library handle, as printed by the linker.
    pub handle: String,
    /// Namespace the library lives in.
    pub namespace: String,
    /// Soname prefix written into the copy.
    pub identity: String,
    /// On-disk copy, if one was written.
    pub copy: Option<PathBuf>,
}

/// Executes the `load` command.
///
/// # Errors
///
/// Returns an error if the linker is unavailable or any load step fails.
pub fn execute(args: LoadArgs, config: LoaderConfig) -> anyhow::Result<()> {
    let context = LoaderContext::init_global(config)
        .context("linker namespace support is unavailable in this process")?;
    let parent = context
        .namespaces()
        .exported(&args.parent)
        .with_context(|| format!("namespace {:?} is not exported", args.parent))?;

    let mut request = LoadRequest::new(&args.library, parent)
        .mode(args.mode.flags())
        .link_to_default(args.link_default);
    if let Some(dir) = args.target_dir {
        request = request.target_dir(dir);
    }
    if let (Some(dir), Some(name)) = (args.hook_dir, args.hook) {
        request = request.hook(dir, name);
    }

    let loaded = context
        .load_isolated(&request)
        .with_context(|| format!("failed to load {}", args.library.display()))?;
    let report = LoadReport {
        handle: loaded.handle.to_string(),
        namespace: loaded.namespace.to_string(),
        identity: loaded.identity.to_string(),
        copy: loaded.copy.path().map(PathBuf::from),
    };

    if args.json {
        return output::print_json(&report);
    }
    println!("{:<12} {}", "HANDLE", report.handle);
    println!("{:<12} {}", "NAMESPACE", report.namespace);
    println!("{:<12} {}", "IDENTITY", report.identity);
    println!(
        "{:<12} {}",
        "COPY",
        report
            .copy
            .as_ref()
            .map_or_else(|| "(memory)".to_string(), |p| p.display().to_string())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_modes_map_to_dlopen_flags() {
        assert_eq!(BindMode::Now.flags(), libc::RTLD_NOW);
        assert_eq!(BindMode::Lazy.flags(), libc::RTLD_LAZY);
    }
}
