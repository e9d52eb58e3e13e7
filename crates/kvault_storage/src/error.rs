//! Error types for the storage crate.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in file operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A path-specific operation failed.
    #[error("operation failed on {}: {source}", path.display())]
    At {
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl StorageError {
    /// Attach a path to an I/O error.
    pub fn at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::At {
            path: path.into(),
            source,
        }
    }
}
