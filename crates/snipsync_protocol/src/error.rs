//! Error types for protocol operations.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while interpreting sync data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An item name cannot be part of a path.
    #[error("invalid item name {name:?}: {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An item refers to a parent directory that does not exist.
    #[error("item {item_id} refers to missing parent {parent_id}")]
    MissingParent {
        /// The item whose chain is broken.
        item_id: String,
        /// The parent ID that could not be found.
        parent_id: String,
    },

    /// The parent chain loops back on itself.
    #[error("parent chain of item {item_id} contains a cycle")]
    ParentCycle {
        /// The item whose chain loops.
        item_id: String,
    },

    /// A path does not have the expected shape.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl ProtocolError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}
