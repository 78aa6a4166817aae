//! Error types for object-store operations.

use std::io;
use thiserror::Error;

/// Result type for object-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during object-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key cannot address an object.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why the key was rejected.
        reason: String,
    },

    /// The remote answered with an HTTP-class status code.
    #[error("remote returned status {status}: {message}")]
    Http {
        /// Status code (401, 403, 404, 500, ...).
        status: u16,
        /// Message returned by the remote.
        message: String,
    },

    /// The request did not complete in time.
    #[error("remote request timed out")]
    Timeout,

    /// The remote could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates an HTTP-class error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the remote rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Http { status: 401 | 403, .. })
    }

    /// Returns true if the failure is likely to go away on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout | StoreError::Unavailable(_) => true,
            StoreError::Http { status, .. } => *status == 429 || *status >= 500,
            StoreError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            StoreError::InvalidKey { .. } => false,
        }
    }
}
