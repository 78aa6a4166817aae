//! The cloud metadata object.
//!
//! A small JSON document uploaded after every log write. Its
//! `historyFileHash` lets a device tell whether the remote log moved since
//! its baseline without downloading the log.

use crate::error::ProtocolResult;
use crate::hash::history_hash;
use crate::snapshot::rebuild_snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current metadata format version.
pub const METADATA_VERSION: u32 = 1;

/// Per-file entry of the metadata index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Sync hash of the file.
    pub hash: String,
}

/// Per-directory entry of the metadata index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMeta {}

/// Fingerprint of the remote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudMetadata {
    /// Format version.
    pub version: u32,
    /// When the last writer finished its cycle.
    pub last_sync_timestamp: DateTime<Utc>,
    /// Hash of the remote log text.
    pub history_file_hash: String,
    /// Live files and their hashes.
    #[serde(default)]
    pub files: BTreeMap<String, FileMeta>,
    /// Live directories.
    #[serde(default)]
    pub directories: BTreeMap<String, DirectoryMeta>,
}

impl CloudMetadata {
    /// Builds metadata describing a log.
    pub fn from_log(text: &str, now: DateTime<Utc>) -> Self {
        let snapshot = rebuild_snapshot(text);
        Self {
            version: METADATA_VERSION,
            last_sync_timestamp: now,
            history_file_hash: history_hash(text),
            files: snapshot
                .files
                .into_iter()
                .map(|(path, state)| (path, FileMeta { hash: state.hash }))
                .collect(),
            directories: snapshot
                .directories
                .into_iter()
                .map(|path| (path, DirectoryMeta {}))
                .collect(),
        }
    }

    /// Returns true if this metadata was written for exactly this log text.
    pub fn describes(&self, text: &str) -> bool {
        self.history_file_hash == history_hash(text)
    }

    /// Encodes as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a metadata document.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
