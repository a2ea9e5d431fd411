//! Error types for the memo crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for memoization operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error during memo operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(memokit::io),
        help("Check file permissions and ensure the memo path is writable")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "create_dir_all")
        operation: String,
    },

    /// A value could not be turned into a deterministic byte representation
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(memokit::serialization),
        help("Inputs must be serializable with serde; maps need string keys")
    )]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Configuration or validation error
    #[error("Memo configuration error: {message}")]
    #[diagnostic(code(memokit::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A pointer file could not be materialized
    #[error("Failed to materialize pointer file {}: {message}", path.display())]
    #[diagnostic(
        code(memokit::materialization),
        help("Make sure the materialization tool is installed and on PATH")
    )]
    Materialization {
        /// The pointer file
        path: Box<Path>,
        /// What went wrong
        message: String,
    },

    /// Remote store failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Remote(#[from] memokit_remote::RemoteError),
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a materialization error
    #[must_use]
    pub fn materialization(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::Materialization {
            path: path.as_ref().into(),
            message: msg.into(),
        }
    }
}

/// Result type for memo operations
pub type Result<T> = std::result::Result<T, Error>;
