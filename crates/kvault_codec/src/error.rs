//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A store or key name exceeds the one-byte length prefix.
    #[error("name too long: {len} bytes (maximum 255)")]
    NameTooLong {
        /// UTF-8 byte length of the offending name.
        len: usize,
    },

    /// The payload could not be serialized to JSON.
    #[error("payload serialization failed: {message}")]
    Serialize {
        /// Description of the serialization error.
        message: String,
    },

    /// Non-finite floating point values cannot be represented in JSON.
    #[error("non-finite number cannot be stored")]
    NonFiniteNumber,

    /// A batch buffer is too short to frame even one record.
    #[error("batch buffer too short to frame a record")]
    Truncated,
}

impl CodecError {
    /// Create a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }
}
