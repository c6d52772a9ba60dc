//! # linkerns-core
//!
//! Access to the Android dynamic linker's private namespace API.
//!
//! This crate provides:
//! - **Address discovery**: locating the unexported internal open routine by
//!   decoding the public `dlopen` trampoline.
//! - **Resolver**: one-time, process-wide binding of the private namespace
//!   entry points, surfaced through [`resolver::is_ready`].
//! - **Namespace controller**: create, link and hook operations over any
//!   [`linker::LinkerApi`] implementation.
//!
//! All unsafe linker calls are encapsulated in the platform module with
//! `// SAFETY:` documentation. On targets other than Android/aarch64 the
//! resolver reports the platform as unsupported and stays inert.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod address;
pub mod linker;
pub mod namespace;
pub mod resolver;

#[cfg(all(target_os = "android", target_arch = "aarch64"))]
mod platform;
