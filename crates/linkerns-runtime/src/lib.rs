//! # linkerns-runtime
//!
//! Loads a library into a fresh linker namespace under a unique soname,
//! optionally alongside a hook library that receives a caller pointer.
//!
//! [`loader::LoaderContext::load_isolated`] is the entry point for Rust
//! callers; [`c_api`] exposes the same operations to native code.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod c_api;
pub mod counter;
pub mod destination;
pub mod loader;
pub mod request;

pub use loader::{IsolatedLibrary, LoaderContext};
pub use request::LoadRequest;
