//! Error handling for transcript ingestion and dataset handling.
//!
//! Parsing itself is total: a malformed transcript degrades to an
//! unknown-outcome record rather than an error. Errors are reserved for
//! the edges of the crate where I/O, JSON, or caller input can fail.

use thiserror::Error;

/// Errors surfaced by ingestion, dataset (de)serialization, and the CLI.
#[derive(Debug, Error)]
pub enum CotejarError {
    /// Reading a transcript directory or writing a dataset failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path of the file or directory involved.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing or deserializing a dataset failed.
    #[error("json error: {source}")]
    Json {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// A caller-supplied argument could not be interpreted.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CotejarError>;

impl CotejarError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`CotejarError::InvalidArgument`] from a message.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}
