//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use snipsync_protocol::ConflictPolicy;
use std::time::Duration;

/// Default key of the remote history log.
pub const DEFAULT_HISTORY_KEY: &str = "sync/history.log";
/// Default key of the remote metadata object.
pub const DEFAULT_METADATA_KEY: &str = "sync/metadata.json";
/// Default key prefix of snippet objects.
pub const DEFAULT_SNIPPET_PREFIX: &str = "snippets/";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Short identifier of this device, written into log entries.
    pub device_tag: String,
    /// Object key of the history log.
    pub history_key: String,
    /// Object key of the metadata document.
    pub metadata_key: String,
    /// Prefix prepended to snippet paths to form object keys.
    pub snippet_prefix: String,
    /// What to do with conflicts no merge or decision settles.
    pub conflict_policy: ConflictPolicy,
    /// Quiet period after the conflict watcher acts.
    pub watcher_cooldown: Duration,
}

impl SyncConfig {
    /// Creates a configuration with the default key layout.
    pub fn new(device_tag: impl Into<String>) -> Self {
        Self {
            device_tag: device_tag.into(),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
            snippet_prefix: DEFAULT_SNIPPET_PREFIX.to_string(),
            conflict_policy: ConflictPolicy::default(),
            watcher_cooldown: Duration::from_secs(2),
        }
    }

    /// Sets the history log key.
    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.history_key = key.into();
        self
    }

    /// Sets the metadata key.
    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    /// Sets the snippet object prefix.
    pub fn with_snippet_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.snippet_prefix = prefix.into();
        self
    }

    /// Sets the conflict fallback policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the watcher cooldown.
    pub fn with_watcher_cooldown(mut self, cooldown: Duration) -> Self {
        self.watcher_cooldown = cooldown;
        self
    }

    /// Object key for a snippet path.
    pub fn object_key(&self, path: &str) -> String {
        format!("{}{}", self.snippet_prefix, path)
    }

    /// Checks that the configuration can address the remote.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] describing the first problem.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device_tag.trim().is_empty() {
            return Err(SyncError::Configuration("device tag is empty".into()));
        }
        if self.device_tag.contains(&['|', '\n', '\r'][..]) {
            return Err(SyncError::Configuration(format!(
                "device tag {:?} contains a reserved character",
                self.device_tag
            )));
        }
        if self.history_key.is_empty() || self.metadata_key.is_empty() {
            return Err(SyncError::Configuration("remote keys must not be empty".into()));
        }
        if self.snippet_prefix.is_empty() {
            return Err(SyncError::Configuration("snippet prefix is empty".into()));
        }
        if self.history_key == self.metadata_key {
            return Err(SyncError::Configuration(
                "history and metadata keys must differ".into(),
            ));
        }
        for key in [&self.history_key, &self.metadata_key] {
            if key.starts_with(self.snippet_prefix.as_str()) {
                return Err(SyncError::Configuration(format!(
                    "{key} lies under the snippet prefix {}",
                    self.snippet_prefix
                )));
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("device")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("laptop")
            .with_history_key("h.log")
            .with_metadata_key("m.json")
            .with_snippet_prefix("items/")
            .with_conflict_policy(ConflictPolicy::Block)
            .with_watcher_cooldown(Duration::from_millis(500));

        assert_eq!(config.device_tag, "laptop");
        assert_eq!(config.history_key, "h.log");
        assert_eq!(config.object_key("a/b.snippet"), "items/a/b.snippet");
        assert_eq!(config.conflict_policy, ConflictPolicy::Block);
        assert_eq!(config.watcher_cooldown, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert_eq!(config.object_key("x.snippet"), "snippets/x.snippet");
        assert_eq!(config.conflict_policy, ConflictPolicy::KeepLocal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(SyncConfig::new("  ").validate().is_err());
        assert!(SyncConfig::new("a|b").validate().is_err());
        assert!(SyncConfig::new("dev").with_history_key("").validate().is_err());
        assert!(SyncConfig::new("dev")
            .with_metadata_key(DEFAULT_HISTORY_KEY)
            .validate()
            .is_err());
        assert!(SyncConfig::new("dev")
            .with_history_key("snippets/log")
            .validate()
            .is_err());
    }
}
