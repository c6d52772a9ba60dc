//! One-time, process-wide resolution of the private linker entry points.
//!
//! Resolution runs at most once per process, on first use. If any step
//! fails the process stays without linker namespace support for its whole
//! lifetime; callers learn this only through [`is_ready`].

use std::sync::OnceLock;

use linkerns_common::config::LoaderConfig;
use linkerns_common::error::{LinkerNsError, Result};

use crate::linker::LinkerApi;

static RESOLVED: OnceLock<Option<Box<dyn LinkerApi>>> = OnceLock::new();

#[cfg(all(target_os = "android", target_arch = "aarch64"))]
fn resolve(scan_limit: usize) -> Result<Box<dyn LinkerApi>> {
    crate::platform::resolve(scan_limit).map(|linker| Box::new(linker) as Box<dyn LinkerApi>)
}

#[cfg(not(all(target_os = "android", target_arch = "aarch64")))]
fn resolve(_scan_limit: usize) -> Result<Box<dyn LinkerApi>> {
    Err(LinkerNsError::Unsupported {
        feature: format!(
            "linker namespaces on {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ),
    })
}

/// Runs resolution with `config` unless it has already run.
///
/// Only the first call in a process has any effect; later calls return the
/// outcome of that first attempt.
pub fn initialize(config: &LoaderConfig) -> bool {
    RESOLVED
        .get_or_init(|| match resolve(config.trampoline_scan_limit) {
            Ok(linker) => {
                tracing::info!("linker namespace entry points resolved");
                Some(linker)
            }
            Err(e) => {
                tracing::warn!(error = %e, "linker namespace support disabled");
                None
            }
        })
        .is_some()
}

/// Returns the resolved entry points, resolving with defaults on first use.
pub fn resolved_linker() -> Option<&'static dyn LinkerApi> {
    if RESOLVED.get().is_none() {
        let _ = initialize(&LoaderConfig::default());
    }
    RESOLVED.get().and_then(Option::as_deref)
}

/// Returns the resolved entry points or `LinkerNsError::NotReady`.
///
/// # Errors
///
/// Returns `LinkerNsError::NotReady` if resolution failed.
pub fn require_linker() -> Result<&'static dyn LinkerApi> {
    resolved_linker().ok_or(LinkerNsError::NotReady)
}

/// Returns whether the private linker entry points are usable.
pub fn is_ready() -> bool {
    resolved_linker().is_some()
}
