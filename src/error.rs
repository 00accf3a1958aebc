//! Error types for collision-stats.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for collision-stats operations
pub type Result<T> = std::result::Result<T, CollisionError>;

/// Error type for collision-stats operations
#[derive(Error, Debug)]
pub enum CollisionError {
    /// The input file could not be opened or mapped
    #[error("Cannot open '{}': {source}", path.display())]
    FileOpen {
        /// Path that was requested
        path: PathBuf,
        /// Underlying I/O failure
        source: io::Error,
    },

    /// A byte offset could not be reached in the source
    #[error("Cannot seek to offset {offset}: {reason}")]
    Seek {
        /// Absolute byte offset
        offset: u64,
        /// Explanation of the failure
        reason: String,
    },

    /// The file does not match the fixed-width layout
    #[error("Invalid layout for a {total_len}-byte file: {reason}")]
    Layout {
        /// Total file length in bytes
        total_len: u64,
        /// Explanation of the mismatch
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// A worker failed or went away mid-run
    #[error("Worker {worker} failed: {reason}")]
    Worker {
        /// Index of the worker
        worker: usize,
        /// What the worker reported
        reason: String,
    },

    /// The worker pool was shut down by an earlier failure
    #[error("Workers were stopped after an earlier failure")]
    Stopped,

    /// Any other I/O failure
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CollisionError {
    pub(crate) fn invalid_parameter(parameter: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }
}
