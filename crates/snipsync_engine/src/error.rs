//! Error types for the sync engine.

use snipsync_protocol::ProtocolError;
use snipsync_store::StoreError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The engine is not configured well enough to talk to the remote.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote object store failed.
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),

    /// Encoding or decoding a protocol document failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Remote data does not hold together.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The local item store refused an operation.
    #[error("local store error: {0}")]
    LocalStore(String),

    /// Persisting the baseline or status failed.
    #[error("state persistence error: {0}")]
    State(#[from] std::io::Error),

    /// Conflicts remain that the policy refuses to settle.
    #[error("unresolved conflicts on {}", paths.join(", "))]
    UnresolvedConflict {
        /// Conflicting paths.
        paths: Vec<String>,
    },

    /// The user is editing; syncing now could overwrite their work.
    #[error("sync skipped while the user is editing")]
    UserEditing,

    /// Another cycle is running in this instance.
    #[error("a sync cycle is already running")]
    AlreadySyncing,
}

/// Broad classes of failure, used to pick a message and decide whether a
/// retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Missing or invalid settings. Retrying will not help.
    Configuration,
    /// The remote could not be reached or was overloaded.
    TransientNetwork,
    /// The remote rejected the credentials.
    Authentication,
    /// Remote data is malformed or inconsistent.
    DataIntegrity,
    /// A conflict needs a decision.
    Conflict,
    /// The local store failed.
    LocalStore,
    /// The engine was busy or the user was editing.
    Busy,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::TransientNetwork => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::DataIntegrity => "data integrity",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::LocalStore => "local store",
            ErrorCategory::Busy => "busy",
        };
        f.write_str(name)
    }
}

impl SyncError {
    /// Creates a data integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Creates a local store error.
    pub fn local(message: impl Into<String>) -> Self {
        Self::LocalStore(message.into())
    }

    /// Classifies the error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Configuration(_) => ErrorCategory::Configuration,
            SyncError::Store(err) if err.is_auth() => ErrorCategory::Authentication,
            SyncError::Store(StoreError::InvalidKey { .. }) => ErrorCategory::Configuration,
            SyncError::Store(_) => ErrorCategory::TransientNetwork,
            SyncError::Protocol(_) | SyncError::DataIntegrity(_) => ErrorCategory::DataIntegrity,
            SyncError::LocalStore(_) | SyncError::State(_) => ErrorCategory::LocalStore,
            SyncError::UnresolvedConflict { .. } => ErrorCategory::Conflict,
            SyncError::UserEditing | SyncError::AlreadySyncing => ErrorCategory::Busy,
        }
    }

    /// Returns true if running the cycle again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(err) => err.is_transient(),
            SyncError::UserEditing | SyncError::AlreadySyncing => true,
            _ => false,
        }
    }

    /// A human-readable description with a hint at the likely cause.
    pub fn user_message(&self) -> String {
        let hint = match self {
            SyncError::Configuration(_) => {
                "Check the remote location and device settings.".to_string()
            }
            SyncError::Store(StoreError::Http { status: 401, .. }) => {
                "The remote rejected the credentials. Sign in again.".to_string()
            }
            SyncError::Store(StoreError::Http { status: 403, .. }) => {
                "The credentials lack access to the remote. Check its permissions.".to_string()
            }
            SyncError::Store(StoreError::Http { status: 404, .. }) => {
                "The remote location does not exist. Check its address.".to_string()
            }
            SyncError::Store(StoreError::Http { status: 429, .. }) => {
                "The remote is rate limiting requests. Try again in a few minutes.".to_string()
            }
            SyncError::Store(err) if err.is_transient() => {
                "The remote could not be reached. Check the network and try again.".to_string()
            }
            SyncError::Store(StoreError::InvalidKey { .. }) => {
                "An object key is invalid. Check the configured key layout.".to_string()
            }
            SyncError::Store(_) => "The remote store failed. Try again later.".to_string(),
            SyncError::Protocol(_) | SyncError::DataIntegrity(_) => {
                "Remote sync data looks damaged. A force reset rebuilds it from this device."
                    .to_string()
            }
            SyncError::LocalStore(_) | SyncError::State(_) => {
                "Local data could not be updated. Check disk space and permissions.".to_string()
            }
            SyncError::UnresolvedConflict { paths } => format!(
                "{} item(s) changed on both sides. Resolve them and sync again.",
                paths.len()
            ),
            SyncError::UserEditing => "Sync will run once editing stops.".to_string(),
            SyncError::AlreadySyncing => "A sync is already in progress.".to_string(),
        };
        format!("Sync failed ({}): {self}. {hint}", self.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(
            SyncError::Store(StoreError::http(401, "no")).category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            SyncError::Store(StoreError::http(503, "busy")).category(),
            ErrorCategory::TransientNetwork
        );
        assert_eq!(
            SyncError::Store(StoreError::invalid_key("", "empty")).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            SyncError::integrity("bad log").category(),
            ErrorCategory::DataIntegrity
        );
        assert_eq!(SyncError::AlreadySyncing.category(), ErrorCategory::Busy);
        assert_eq!(
            SyncError::UnresolvedConflict { paths: vec!["a.snippet".into()] }.category(),
            ErrorCategory::Conflict
        );
    }

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Store(StoreError::Timeout).is_retryable());
        assert!(!SyncError::Store(StoreError::http(403, "no")).is_retryable());
        assert!(!SyncError::Configuration("no remote".into()).is_retryable());
        assert!(SyncError::UserEditing.is_retryable());
    }

    #[test]
    fn user_messages_carry_hints() {
        let msg = SyncError::Store(StoreError::http(401, "expired")).user_message();
        assert!(msg.contains("authentication"));
        assert!(msg.contains("Sign in again"));

        let msg = SyncError::UnresolvedConflict {
            paths: vec!["a.snippet".into(), "b.snippet".into()],
        }
        .user_message();
        assert!(msg.contains("2 item(s)"));
        assert!(msg.contains("a.snippet, b.snippet"));
    }
}
