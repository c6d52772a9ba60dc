//! # linkerns-elf
//!
//! Reading and rewriting the embedded identity (`DT_SONAME`) of shared
//! objects.
//!
//! The Android linker caches loaded libraries by soname, so two loads of
//! the same library collide even from different namespaces. Overwriting
//! the first three bytes of the soname (normally `lib`) with a per-load
//! identity makes every copy distinct.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod image;
pub mod patch;

#[cfg(test)]
mod fixture;

pub use image::{ElfImage, read_soname};
pub use patch::{ElfSonamePatcher, SonamePatcher, patch_soname};
