//! CLI command definitions and dispatch.

pub mod load;
pub mod patch;
pub mod soname;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use linkerns_common::config::LoaderConfig;

/// lnsctl — isolated library loading through Android linker namespaces.
#[derive(Parser, Debug)]
#[command(name = "lnsctl", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON loader configuration; unset fields keep their defaults.
    #[arg(long, global = true, env = "LNSCTL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether the linker namespace API is usable here.
    Status(status::StatusArgs),
    /// Print the soname embedded in a shared library.
    Soname(soname::SonameArgs),
    /// Write a copy of a library with a renamed soname.
    Patch(patch::PatchArgs),
    /// Load a library into an isolated namespace in this process.
    Load(load::LoadArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Status(args) => status::execute(args, &config),
        Command::Soname(args) => soname::execute(args),
        Command::Patch(args) => patch::execute(args),
        Command::Load(args) => load::execute(args, config),
    }
}

/// Reads a JSON configuration file, or returns the defaults when `path`
/// is `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LoaderConfig> {
    let Some(path) = path else {
        return Ok(LoaderConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = LoaderConfig::from_json(&json)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), LoaderConfig::default());
    }

    #[test]
    fn config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{"hook_param_symbol": "driver_param"}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.hook_param_symbol, "driver_param");
        assert_eq!(config.patched_extension, "so");
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{"trampoline_scan_limit": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn cli_parses_load_arguments() {
        let cli = Cli::try_parse_from([
            "lnsctl",
            "load",
            "/vendor/lib64/libfoo.so",
            "--target-dir",
            "/data/local/tmp",
            "--hook-dir",
            "/data/local/tmp/hooks",
            "--hook",
            "libhook.so",
            "--link-default",
        ])
        .unwrap();
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.library, PathBuf::from("/vendor/lib64/libfoo.so"));
        assert_eq!(args.hook.as_deref(), Some("libhook.so"));
        assert!(args.link_default);
    }

    #[test]
    fn hook_requires_hook_dir() {
        assert!(
            Cli::try_parse_from(["lnsctl", "load", "libfoo.so", "--hook", "libhook.so"]).is_err()
        );
    }
}
