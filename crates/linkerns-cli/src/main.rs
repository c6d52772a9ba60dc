//! # lnsctl — linker namespace control
//!
//! Inspects libraries, writes renamed copies and performs isolated loads
//! through the Android linker's private namespace API.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
