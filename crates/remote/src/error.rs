//! Error types for the remote object-store client

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while talking to a remote object store
#[derive(Error, Debug, Diagnostic)]
pub enum RemoteError {
    /// The URI could not be parsed or uses the wrong scheme
    #[error("Invalid remote URI '{uri}': {message}")]
    #[diagnostic(
        code(memokit_remote::invalid_uri),
        help("Remote memo paths look like <scheme>://owner/repo/branch/path")
    )]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Why it was rejected
        message: String,
    },

    /// Transport-level failure (connection refused, timeout, TLS)
    #[error("HTTP request to {url} failed")]
    #[diagnostic(code(memokit_remote::http))]
    Http {
        /// Request URL
        url: String,
        /// The underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status other than 404
    #[error("Remote store returned {status} for {url}")]
    #[diagnostic(code(memokit_remote::status))]
    Status {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
    },

    /// A transaction was used after it had been committed
    #[error("Transaction already committed")]
    #[diagnostic(
        code(memokit_remote::transaction_closed),
        help("Open a new transaction for further writes")
    )]
    TransactionClosed,

    /// Client configuration is unusable
    #[error("Remote configuration error: {message}")]
    #[diagnostic(code(memokit_remote::config))]
    Configuration {
        /// Description of the problem
        message: String,
    },
}

impl RemoteError {
    /// Create an invalid URI error
    #[must_use]
    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error means the object simply does not exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Result type for remote operations
pub type Result<T> = std::result::Result<T, RemoteError>;
