//! Unified error types for the shellns workspace.
//!
//! Stale namespace state and individual mount failures are recovered locally
//! and never reach this type; what remains are the failures a caller has to
//! see: construction errors, privilege/spawn errors, and bad configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ShellnsError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A marker file exists but does not hold a process id.
    #[error("corrupt marker {path}: {content:?}")]
    CorruptMarker {
        /// Marker file path.
        path: PathBuf,
        /// Trimmed file content.
        content: String,
    },

    /// A resource with the same identifier is already live.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
    },

    /// The privilege tool refused or failed to run.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A process invocation could not be constructed.
    #[error("cannot build invocation: {message}")]
    Invocation {
        /// Why the invocation could not be built.
        message: String,
    },

    /// A process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
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
pub type Result<T> = std::result::Result<T, ShellnsError>;
