//! Unified error types for the linkerns workspace.
//!
//! Every fallible operation in the workspace reports through
//! [`LinkerNsError`]. The C ABI surface collapses it back into
//! null/`false` sentinels.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum LinkerNsError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The private linker entry points were never resolved for this process.
    #[error("linker namespace entry points are not available in this process")]
    NotReady,

    /// A step of private symbol resolution failed.
    #[error("linker symbol resolution failed: {step}")]
    Resolve {
        /// The resolution step that failed.
        step: String,
    },

    /// The platform linker rejected a namespace operation.
    #[error("{operation} failed: {message}")]
    Namespace {
        /// Operation that was rejected.
        operation: &'static str,
        /// Message reported by the linker, if any.
        message: String,
    },

    /// The platform linker failed to load a library.
    #[error("failed to load {path}: {message}")]
    Load {
        /// Library path (or pseudo-path) handed to the linker.
        path: String,
        /// Message reported by the linker, if any.
        message: String,
    },

    /// A hook library and its parameter do not agree.
    #[error("hook contract violated: {message}")]
    HookContract {
        /// Description of the mismatch.
        message: String,
    },

    /// The running kernel or platform lacks a required feature.
    #[error("unsupported: {feature}")]
    Unsupported {
        /// The missing feature.
        feature: String,
    },

    /// An argument cannot be passed across the linker boundary.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Rewriting the embedded library identity failed.
    #[error("cannot patch {path}: {message}")]
    Patch {
        /// Source library path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LinkerNsError>;
