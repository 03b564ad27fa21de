//! Error types for driver operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for driver operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while loading or flushing a record store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file exists but cannot be decoded.
    ///
    /// Opening fails instead of starting from an empty store so that no
    /// user data is silently discarded.
    #[error("storage corrupted at {path}: {message}")]
    Corrupted {
        /// Path of the backing file.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The in-memory sets could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl StorageError {
    /// Creates a corruption error for the given file.
    pub fn corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error reports an undecodable backing file.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}
