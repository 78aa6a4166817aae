//! Persisted sync state: the last-synced baseline log and the status record.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const BASELINE_FILE: &str = "baseline.log";
const STATUS_FILE: &str = "status.json";

/// Status of the most recent cycle, visible across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// A cycle is in flight. Left `true` if the process died mid-cycle.
    pub is_syncing: bool,
    /// When the last successful cycle finished.
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared by a successful cycle.
    pub last_error: Option<String>,
}

/// Storage for the baseline log and the status record.
pub trait StateStore: Send + Sync {
    /// Loads the baseline log text, `None` if this device never synced.
    fn load_baseline(&self) -> SyncResult<Option<String>>;

    /// Replaces the baseline log text.
    fn save_baseline(&self, text: &str) -> SyncResult<()>;

    /// Forgets the baseline.
    fn clear_baseline(&self) -> SyncResult<()>;

    /// Loads the status record.
    fn load_status(&self) -> SyncResult<SyncStatus>;

    /// Replaces the status record.
    fn save_status(&self, status: &SyncStatus) -> SyncResult<()>;
}

/// State kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    baseline: RwLock<Option<String>>,
    status: RwLock<SyncStatus>,
}

impl MemoryStateStore {
    /// Creates an empty state store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load_baseline(&self) -> SyncResult<Option<String>> {
        Ok(self.baseline.read().clone())
    }

    fn save_baseline(&self, text: &str) -> SyncResult<()> {
        *self.baseline.write() = Some(text.to_string());
        Ok(())
    }

    fn clear_baseline(&self) -> SyncResult<()> {
        *self.baseline.write() = None;
        Ok(())
    }

    fn load_status(&self) -> SyncResult<SyncStatus> {
        Ok(self.status.read().clone())
    }

    fn save_status(&self, status: &SyncStatus) -> SyncResult<()> {
        *self.status.write() = status.clone();
        Ok(())
    }
}

/// State kept as two files in a directory.
///
/// Files are replaced atomically (write to a temp file, sync, rename) so a
/// crash never leaves a truncated baseline behind.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Opens a state directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> SyncResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// The state directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_optional(&self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_atomic(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let _guard = self.write_lock.lock();
        let target = self.dir.join(name);
        let temp = self.dir.join(format!(".{name}.tmp"));
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &target)
    }
}

impl StateStore for FileStateStore {
    fn load_baseline(&self) -> SyncResult<Option<String>> {
        Ok(self.read_optional(BASELINE_FILE)?)
    }

    fn save_baseline(&self, text: &str) -> SyncResult<()> {
        Ok(self.write_atomic(BASELINE_FILE, text.as_bytes())?)
    }

    fn clear_baseline(&self) -> SyncResult<()> {
        match fs::remove_file(self.dir.join(BASELINE_FILE)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load_status(&self) -> SyncResult<SyncStatus> {
        match self.read_optional(STATUS_FILE)? {
            Some(text) => serde_json::from_str(&text).map_err(|err| {
                crate::error::SyncError::local(format!("unreadable {STATUS_FILE}: {err}"))
            }),
            None => Ok(SyncStatus::default()),
        }
    }

    fn save_status(&self, status: &SyncStatus) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(status)
            .map_err(|err| crate::error::SyncError::local(err.to_string()))?;
        Ok(self.write_atomic(STATUS_FILE, &json)?)
    }
}

impl<S: StateStore + ?Sized> StateStore for std::sync::Arc<S> {
    fn load_baseline(&self) -> SyncResult<Option<String>> {
        (**self).load_baseline()
    }

    fn save_baseline(&self, text: &str) -> SyncResult<()> {
        (**self).save_baseline(text)
    }

    fn clear_baseline(&self) -> SyncResult<()> {
        (**self).clear_baseline()
    }

    fn load_status(&self) -> SyncResult<SyncStatus> {
        (**self).load_status()
    }

    fn save_status(&self, status: &SyncStatus) -> SyncResult<()> {
        (**self).save_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_state_roundtrip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.load_baseline().unwrap(), None);
        store.save_baseline("+ | a/ | h | 2024-01-01T00:00:00.000Z\n").unwrap();
        assert!(store.load_baseline().unwrap().is_some());
        store.clear_baseline().unwrap();
        assert_eq!(store.load_baseline().unwrap(), None);
    }

    #[test]
    fn file_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStateStore::open(dir.path()).unwrap();
            store.save_baseline("log text\n").unwrap();
            store
                .save_status(&SyncStatus {
                    is_syncing: true,
                    last_sync_timestamp: None,
                    last_error: Some("boom".into()),
                })
                .unwrap();
        }

        let store = FileStateStore::open(dir.path()).unwrap();
        assert_eq!(store.load_baseline().unwrap().as_deref(), Some("log text\n"));
        let status = store.load_status().unwrap();
        assert!(status.is_syncing);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
        assert!(!dir.path().join(".baseline.log.tmp").exists());
    }

    #[test]
    fn missing_files_read_as_defaults() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("nested")).unwrap();
        assert_eq!(store.load_baseline().unwrap(), None);
        assert_eq!(store.load_status().unwrap(), SyncStatus::default());
        store.clear_baseline().unwrap();
    }

    #[test]
    fn status_json_is_camel_case() {
        let json = serde_json::to_string(&SyncStatus::default()).unwrap();
        assert!(json.contains("isSyncing"));
        assert!(json.contains("lastError"));
    }
}
