//! Conflict records and fallback policies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A path both sides changed to different states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Item path.
    pub path: String,
    /// What diverged.
    pub kind: ConflictKind,
    /// Local hash, `None` if deleted locally.
    pub local_hash: Option<String>,
    /// Remote hash, `None` if deleted remotely.
    pub remote_hash: Option<String>,
    /// How it was settled, if it was.
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates an unresolved conflict, inferring its kind from which side
    /// still has the item.
    pub fn new(path: impl Into<String>, local_hash: Option<String>, remote_hash: Option<String>) -> Self {
        let kind = match (&local_hash, &remote_hash) {
            (Some(_), None) => ConflictKind::ModifiedDeleted,
            (None, Some(_)) => ConflictKind::DeletedModified,
            _ => ConflictKind::ContentDiverged,
        };
        Self {
            path: path.into(),
            kind,
            local_hash,
            remote_hash,
            resolution: None,
        }
    }

    /// Records a resolution.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Kind of divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Both sides hold different content.
    ContentDiverged,
    /// Modified locally, deleted remotely.
    ModifiedDeleted,
    /// Deleted locally, modified remotely.
    DeletedModified,
}

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// The local version survives.
    KeepLocal,
    /// The remote version replaces the local one.
    AcceptRemote,
    /// A merged version replaces both.
    Merged,
}

/// What to do when no merge and no decision settle a conflict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Keep the local version; the remote change is overwritten.
    #[default]
    KeepLocal,
    /// Take the remote version; the local change is dropped.
    AcceptRemote,
    /// Abort the cycle and leave the conflict for the user.
    Block,
}

impl ConflictPolicy {
    /// The resolution this policy picks, or `None` if it blocks.
    pub fn resolution(&self) -> Option<ConflictResolution> {
        match self {
            ConflictPolicy::KeepLocal => Some(ConflictResolution::KeepLocal),
            ConflictPolicy::AcceptRemote => Some(ConflictResolution::AcceptRemote),
            ConflictPolicy::Block => None,
        }
    }

    /// Resolves a conflict according to this policy.
    ///
    /// Returns false if the policy blocks.
    pub fn resolve(&self, conflict: &mut Conflict) -> bool {
        match self.resolution() {
            Some(resolution) => {
                conflict.resolve(resolution);
                true
            }
            None => false,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::KeepLocal => "keep-local",
            ConflictPolicy::AcceptRemote => "accept-remote",
            ConflictPolicy::Block => "block",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep-local" => Ok(ConflictPolicy::KeepLocal),
            "accept-remote" => Ok(ConflictPolicy::AcceptRemote),
            "block" => Ok(ConflictPolicy::Block),
            other => Err(format!(
                "unknown conflict policy {other:?} (expected keep-local, accept-remote or block)"
            )),
        }
    }
}
