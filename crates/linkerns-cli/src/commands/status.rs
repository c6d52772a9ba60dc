//! `lnsctl status` — Report linker namespace readiness.

use clap::Args;
use linkerns_common::config::LoaderConfig;
use linkerns_core::resolver;
use serde::Serialize;

use crate::output;

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Readiness of this process, as printed by `status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Whether the private linker entry points were resolved.
    pub ready: bool,
    /// Operating system of this build.
    pub os: &'static str,
    /// Architecture of this build.
    pub arch: &'static str,
    /// Configuration used for resolution.
    pub config: LoaderConfig,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if JSON output cannot be produced.
pub fn execute(args: StatusArgs, config: &LoaderConfig) -> anyhow::Result<()> {
    let report = StatusReport {
        ready: resolver::initialize(config),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        config: config.clone(),
    };

    if args.json {
        return output::print_json(&report);
    }

    println!("{:<12} {}", "READY", output::yes_no(report.ready));
    println!("{:<12} {}/{}", "PLATFORM", report.os, report.arch);
    println!("{:<12} {}", "HOOK SLOT", report.config.hook_param_symbol);
    println!("{:<12} *_patched.{}", "COPIES", report.config.patched_extension);
    Ok(())
}
