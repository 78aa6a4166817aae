//! Test fixtures and engine helpers.
//!
//! Provides library builders, recording collaborators and ready-made
//! devices sharing one in-memory remote.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use snipsync_engine::{
    LocalStore, ManualClock, MemoryLocalStore, MergeWorkspace, SyncConfig, SyncCycleResult, SyncEngine,
    SyncError, SyncListener, SyncResult,
};
use snipsync_protocol::{
    parse_timestamp, snippet_name_from_path, Conflict, Library, PathDirectory, PathLibrary,
    PathSnippet,
};
use snipsync_store::{DirectoryObjectStore, InMemoryObjectStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Default language of builder snippets.
pub const DEFAULT_LANGUAGE: &str = "text";

/// Builds libraries from paths.
///
/// IDs come from the paths, so two builders given the same calls produce
/// equal libraries.
#[derive(Debug, Clone, Default)]
pub struct LibraryBuilder {
    library: PathLibrary,
}

impl LibraryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory; `path` must end in `/`.
    pub fn directory(mut self, path: &str) -> Self {
        self.library.directories.push(PathDirectory {
            full_path: path.to_string(),
            name: String::new(),
            order: 0,
        });
        self
    }

    /// Adds a plain-text snippet; `path` must end in `.snippet`.
    pub fn snippet(self, path: &str, code: &str) -> Self {
        self.snippet_in(path, code, DEFAULT_LANGUAGE)
    }

    /// Adds a snippet with a language.
    pub fn snippet_in(mut self, path: &str, code: &str, language: &str) -> Self {
        self.library.snippets.push(PathSnippet {
            full_path: path.to_string(),
            name: snippet_name_from_path(path).unwrap_or_default().to_string(),
            code: code.to_string(),
            language: language.to_string(),
            order: 0,
            create_time: 0,
        });
        self
    }

    /// The path-addressed form.
    pub fn build_paths(&self) -> PathLibrary {
        self.library.clone()
    }

    /// The parent-link form, with implied directories filled in.
    pub fn build(&self) -> Library {
        self.library.to_library()
    }
}

/// Fixed start time of test clocks.
pub fn test_epoch() -> DateTime<Utc> {
    parse_timestamp("2024-01-01T00:00:00.000Z").expect("valid timestamp")
}

/// A manual clock stopped at [`test_epoch`].
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_epoch()))
}

/// Records every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    completed: Mutex<Vec<SyncCycleResult>>,
    errors: Mutex<Vec<String>>,
    conflicts: Mutex<Vec<Conflict>>,
    refreshes: Mutex<usize>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful cycles seen.
    pub fn completed(&self) -> Vec<SyncCycleResult> {
        self.completed.lock().clone()
    }

    /// Messages of failed cycles seen.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    /// Every conflict reported.
    pub fn conflicts(&self) -> Vec<Conflict> {
        self.conflicts.lock().clone()
    }

    /// Number of view refresh requests.
    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock()
    }
}

impl SyncListener for RecordingListener {
    fn on_sync_complete(&self, result: &SyncCycleResult) {
        self.completed.lock().push(result.clone());
    }

    fn on_sync_error(&self, error: &SyncError) {
        self.errors.lock().push(error.to_string());
    }

    fn on_conflict_detected(&self, conflicts: &[Conflict]) {
        self.conflicts.lock().extend_from_slice(conflicts);
    }

    fn on_refresh_view(&self) {
        *self.refreshes.lock() += 1;
    }
}

/// Engine type used by [`TestDevice`].
pub type TestEngine = SyncEngine<Arc<InMemoryObjectStore>, Arc<MemoryLocalStore>>;

/// One device: an engine, its local store and a recording listener.
pub struct TestDevice {
    /// The engine.
    pub engine: TestEngine,
    /// The device's local store.
    pub local: Arc<MemoryLocalStore>,
    /// Notifications received.
    pub listener: Arc<RecordingListener>,
}

impl TestDevice {
    /// Creates a device on `remote` holding `library`, with the default
    /// configuration for `tag`.
    pub fn new(
        remote: &Arc<InMemoryObjectStore>,
        tag: &str,
        library: Library,
        clock: Arc<ManualClock>,
    ) -> Self {
        Self::with_config(remote, SyncConfig::new(tag), library, clock)
    }

    /// Creates a device with a custom configuration.
    pub fn with_config(
        remote: &Arc<InMemoryObjectStore>,
        config: SyncConfig,
        library: Library,
        clock: Arc<ManualClock>,
    ) -> Self {
        let local = Arc::new(MemoryLocalStore::with_library(library));
        let listener = Arc::new(RecordingListener::new());
        let engine = SyncEngine::new(config, Arc::clone(remote), Arc::clone(&local))
            .with_clock(clock)
            .with_listener(listener.clone());
        Self {
            engine,
            local,
            listener,
        }
    }

    /// Runs one cycle and panics with its message if it failed.
    pub fn sync_ok(&self) -> SyncCycleResult {
        let result = self.engine.sync();
        assert!(result.success, "sync failed: {}", result.message);
        result
    }

    /// The device's library, path-addressed and keyed by path.
    pub fn snippets(&self) -> BTreeMap<String, PathSnippet> {
        self.local
            .library()
            .and_then(|l| l.to_path_library().map_err(SyncError::from))
            .expect("readable library")
            .snippets
            .into_iter()
            .map(|s| (s.full_path.clone(), s))
            .collect()
    }

    /// Code of the snippet at `path`.
    pub fn code(&self, path: &str) -> Option<String> {
        self.snippets().remove(path).map(|s| s.code)
    }

    /// Live directory paths.
    pub fn directories(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .local
            .library()
            .and_then(|l| l.to_path_library().map_err(SyncError::from))
            .expect("readable library")
            .directories
            .into_iter()
            .map(|d| d.full_path)
            .collect();
        paths.sort();
        paths
    }

    /// Replaces the code of the snippet at `path`.
    pub fn edit(&self, path: &str, code: &str) {
        let library = self.local.library().expect("readable library");
        let paths = library.to_path_library().expect("consistent library");
        let index = paths
            .snippets
            .iter()
            .position(|s| s.full_path == path)
            .unwrap_or_else(|| panic!("no snippet at {path}"));
        let mut snippet = library.snippets[index].clone();
        snippet.code = code.to_string();
        self.local.update_snippet(snippet).expect("update");
    }

    /// Adds a snippet, creating missing parent directories.
    pub fn add(&self, path: &str, code: &str) {
        let mut library = self
            .local
            .library()
            .expect("readable library")
            .to_path_library()
            .expect("consistent library");
        library.snippets.push(PathSnippet {
            full_path: path.to_string(),
            name: snippet_name_from_path(path).unwrap_or_default().to_string(),
            code: code.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            order: 0,
            create_time: 0,
        });
        snipsync_engine::reconcile(&self.local, &library).expect("reconcile");
    }

    /// Deletes the snippet at `path`.
    pub fn remove(&self, path: &str) {
        let mut library = self
            .local
            .library()
            .expect("readable library")
            .to_path_library()
            .expect("consistent library");
        library.snippets.retain(|s| s.full_path != path);
        snipsync_engine::reconcile(&self.local, &library).expect("reconcile");
    }
}

/// A directory-backed bucket and state directory with automatic cleanup.
pub struct TempBucket {
    /// The bucket.
    pub store: Arc<DirectoryObjectStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TempBucket {
    /// Creates an empty bucket under a fresh temp directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = DirectoryObjectStore::open(&temp_dir.path().join("bucket"))
            .map(Arc::new)
            .expect("Failed to open bucket");
        Self { store, temp_dir }
    }

    /// Root of the temp directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A state directory for a device, under the temp directory.
    pub fn state_dir(&self, tag: &str) -> PathBuf {
        self.temp_dir.path().join("state").join(tag)
    }
}

impl Default for TempBucket {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory repository working copy for watcher tests.
#[derive(Debug, Default)]
pub struct FakeWorkspace {
    files: Mutex<BTreeMap<String, String>>,
    merge_pending: Mutex<bool>,
    log: Mutex<Vec<String>>,
}

impl FakeWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a tracked file.
    pub fn write(&self, path: &str, text: &str) {
        self.files.lock().insert(path.to_string(), text.to_string());
    }

    /// Marks a merge as pending or not.
    pub fn set_merge_pending(&self, pending: bool) {
        *self.merge_pending.lock() = pending;
    }

    /// Version-control operations performed so far.
    pub fn operations(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl MergeWorkspace for FakeWorkspace {
    fn tracked_files(&self) -> SyncResult<Vec<String>> {
        Ok(self.files.lock().keys().cloned().collect())
    }

    fn read_file(&self, path: &str) -> SyncResult<String> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::local(format!("{path} is not tracked")))
    }

    fn is_merge_pending(&self) -> SyncResult<bool> {
        Ok(*self.merge_pending.lock())
    }

    fn stage_all(&self) -> SyncResult<()> {
        self.log.lock().push("stage".into());
        Ok(())
    }

    fn commit_merge(&self, message: &str) -> SyncResult<()> {
        self.log.lock().push(format!("commit: {message}"));
        *self.merge_pending.lock() = false;
        Ok(())
    }

    fn push(&self) -> SyncResult<()> {
        self.log.lock().push("push".into());
        Ok(())
    }

    fn load_working_tree(&self) -> SyncResult<PathLibrary> {
        let snippets = self
            .files
            .lock()
            .iter()
            .map(|(path, code)| PathSnippet {
                full_path: path.clone(),
                name: snippet_name_from_path(path).unwrap_or_default().to_string(),
                code: code.clone(),
                language: DEFAULT_LANGUAGE.to_string(),
                order: 0,
                create_time: 0,
            })
            .collect();
        Ok(PathLibrary {
            snippets,
            directories: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_in_parents() {
        let library = LibraryBuilder::new()
            .snippet("a/b/x.snippet", "code")
            .build();
        assert_eq!(library.snippets.len(), 1);
        assert_eq!(library.directories.len(), 2);
    }

    #[test]
    fn device_helpers_edit_the_store() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let device = TestDevice::new(
            &remote,
            "t",
            LibraryBuilder::new().snippet("a/x.snippet", "1").build(),
            test_clock(),
        );
        device.edit("a/x.snippet", "2");
        device.add("b/y.snippet", "3");
        assert_eq!(device.code("a/x.snippet").as_deref(), Some("2"));
        assert_eq!(device.directories(), vec!["a/", "b/"]);
        device.remove("b/y.snippet");
        assert_eq!(device.snippets().len(), 1);
    }

    #[test]
    fn temp_bucket_is_isolated() {
        use snipsync_store::ObjectStore;

        let bucket = TempBucket::new();
        bucket.store.put("sync/history.log", b"").unwrap();
        assert!(bucket.root().join("bucket").exists());
        assert!(bucket.state_dir("a").starts_with(bucket.root()));
    }
}
