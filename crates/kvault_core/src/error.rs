//! Error types and the structured fault channel.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur in vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The store could not be initialized from its root directory.
    #[error("initialization failed: {message}")]
    Initialization {
        /// Description of the failure.
        message: String,
    },

    /// Codec error (name too long, unserializable value).
    #[error("codec error: {0}")]
    Codec(#[from] kvault_codec::CodecError),

    /// File operation error.
    #[error("storage error: {0}")]
    Storage(#[from] kvault_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The injected encrypter failed.
    #[error("crypto error: {message}")]
    Crypto {
        /// Description of the failure.
        message: String,
    },

    /// A secure key was used without an encrypter configured.
    #[error("no encrypter configured for secure key {name}")]
    NoEncrypter {
        /// The secure key name.
        name: String,
    },

    /// A background task panicked or was cancelled.
    #[error("background task failed: {message}")]
    Task {
        /// Description of the failure.
        message: String,
    },
}

impl VaultError {
    /// Create an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a crypto error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a background task error.
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

/// A structured, recoverable failure delivered to the error sink.
///
/// Every recoverable fault in the engine (a corrupt record skipped during
/// batch decode, a per-file I/O failure in a bulk sweep, a decrypt failure)
/// is reported here in addition to its normal error path.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Human-readable description of what failed.
    pub message: String,
    /// The key the failure relates to, when there is one.
    pub key: Option<String>,
    /// The underlying cause, rendered.
    pub cause: Option<String>,
}

impl Fault {
    /// Create a fault with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            key: None,
            cause: None,
        }
    }

    /// Attach the offending key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// Callback invoked with every recoverable fault.
pub type FaultSink = Arc<dyn Fn(&Fault) + Send + Sync>;

/// Internal handle that fans faults out to tracing and the optional sink.
#[derive(Clone, Default)]
pub(crate) struct Faults {
    sink: Option<FaultSink>,
}

impl Faults {
    pub(crate) fn new(sink: Option<FaultSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn report(&self, fault: Fault) {
        warn!(key = ?fault.key, cause = ?fault.cause, "{}", fault.message);
        if let Some(sink) = &self.sink {
            sink(&fault);
        }
    }
}
