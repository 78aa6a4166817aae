//! Change sets between the live library and a snapshot.

use crate::entry::{HistoryEntry, Operation};
use crate::hash::{sync_directory_hash, sync_snippet_hash};
use crate::item::{Library, PathDirectory, PathSnippet};
use crate::log::canonical_sort;
use crate::path::{directory_path, snippet_path};
use crate::snapshot::{rebuild_snapshot, FileState, Snapshot, NO_HASH};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// A live file in the local library, in path form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// The remote object body for this snippet.
    pub object: PathSnippet,
    /// Sync hash.
    pub hash: String,
}

/// The local library indexed by path.
///
/// Items whose path cannot be computed (invalid names, broken parent
/// chains) are left out with a warning. If two snippets resolve to the same
/// path only the first is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Live snippets by path.
    pub files: BTreeMap<String, LocalFile>,
    /// Live directories by path, with their sync hash.
    pub directories: BTreeMap<String, (PathDirectory, String)>,
}

impl LocalState {
    /// Indexes a library by path.
    pub fn from_library(library: &Library) -> Self {
        let dirs = library.directory_map();
        let mut state = Self::default();

        for dir in &library.directories {
            match directory_path(dir, &dirs) {
                Ok(path) => {
                    let hash = sync_directory_hash(dir, &path);
                    let entry = PathDirectory {
                        full_path: path.clone(),
                        name: dir.name.clone(),
                        order: dir.order,
                    };
                    if state.directories.insert(path.clone(), (entry, hash)).is_some() {
                        warn!(%path, "two directories share a path");
                    }
                }
                Err(err) => warn!(id = %dir.id, error = %err, "directory left out of sync"),
            }
        }

        for snippet in &library.snippets {
            match snippet_path(snippet, &dirs) {
                Ok(path) if state.files.contains_key(&path) => {
                    warn!(%path, id = %snippet.id, "duplicate snippet path, keeping the first");
                }
                Ok(path) => {
                    let hash = sync_snippet_hash(snippet, &path);
                    let object = PathSnippet::from_snippet(snippet, path.clone());
                    state.files.insert(path, LocalFile { object, hash });
                }
                Err(err) => warn!(id = %snippet.id, error = %err, "snippet left out of sync"),
            }
        }

        state
    }

    /// Sync hash of a live path.
    pub fn hash_of(&self, path: &str) -> Option<&str> {
        self.files
            .get(path)
            .map(|f| f.hash.as_str())
            .or_else(|| self.directories.get(path).map(|(_, hash)| hash.as_str()))
    }

    /// The snapshot this state would replay to.
    pub fn to_snapshot(&self, timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            files: self
                .files
                .iter()
                .map(|(path, file)| {
                    (
                        path.clone(),
                        FileState {
                            hash: file.hash.clone(),
                            timestamp,
                        },
                    )
                })
                .collect(),
            directories: self.directories.keys().cloned().collect(),
        }
    }

    /// Number of live paths.
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    /// Returns true if there are no live paths.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// One path in a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Item path.
    pub path: String,
    /// New hash for additions and modifications, last known hash for
    /// deletions.
    pub hash: String,
}

impl FileChange {
    fn new(path: &str, hash: &str) -> Self {
        Self {
            path: path.to_string(),
            hash: hash.to_string(),
        }
    }
}

/// Difference between the live library and a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Snippets not in the snapshot.
    pub added_files: Vec<FileChange>,
    /// Snippets whose hash differs from the snapshot.
    pub modified_files: Vec<FileChange>,
    /// Snapshot files no longer live.
    pub deleted_files: Vec<FileChange>,
    /// Directories not in the snapshot.
    pub added_directories: Vec<FileChange>,
    /// Snapshot directories no longer live.
    pub deleted_directories: Vec<FileChange>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.added_files.len()
            + self.modified_files.len()
            + self.deleted_files.len()
            + self.added_directories.len()
            + self.deleted_directories.len()
    }

    /// Every changed path.
    pub fn paths(&self) -> BTreeSet<&str> {
        self.added_files
            .iter()
            .chain(&self.modified_files)
            .chain(&self.deleted_files)
            .chain(&self.added_directories)
            .chain(&self.deleted_directories)
            .map(|c| c.path.as_str())
            .collect()
    }
}

/// Computes what changed in `local` since `baseline`.
///
/// A path present on both sides with a different hash is a modification.
/// Directories carry no content, so they are only ever added or deleted.
pub fn diff(local: &LocalState, baseline: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, (_, hash)) in &local.directories {
        if !baseline.directories.contains(path) {
            changes.added_directories.push(FileChange::new(path, hash));
        }
    }
    for path in &baseline.directories {
        if !local.directories.contains_key(path) {
            changes.deleted_directories.push(FileChange::new(path, NO_HASH));
        }
    }

    for (path, file) in &local.files {
        match baseline.file_hash(path) {
            None => changes.added_files.push(FileChange::new(path, &file.hash)),
            Some(hash) if hash != file.hash => {
                changes.modified_files.push(FileChange::new(path, &file.hash))
            }
            Some(_) => {}
        }
    }
    for (path, state) in &baseline.files {
        if !local.files.contains_key(path) {
            changes.deleted_files.push(FileChange::new(path, &state.hash));
        }
    }

    changes
}

/// [`diff`] against the snapshot of a baseline log's text.
pub fn diff_text(library: &Library, baseline_text: &str) -> ChangeSet {
    diff(
        &LocalState::from_library(library),
        &rebuild_snapshot(baseline_text),
    )
}

/// Converts a change set to history entries in canonical order.
pub fn to_entries(
    changes: &ChangeSet,
    timestamp: DateTime<Utc>,
    device_tag: Option<&str>,
) -> Vec<HistoryEntry> {
    let make = |op: Operation, change: &FileChange| {
        HistoryEntry::new(
            op,
            change.path.as_str(),
            change.hash.as_str(),
            timestamp,
            device_tag.map(str::to_string),
        )
    };

    let mut entries: Vec<HistoryEntry> = changes
        .added_directories
        .iter()
        .map(|c| make(Operation::Add, c))
        .chain(changes.added_files.iter().map(|c| make(Operation::Add, c)))
        .chain(changes.modified_files.iter().map(|c| make(Operation::Modify, c)))
        .chain(changes.deleted_files.iter().map(|c| make(Operation::Delete, c)))
        .chain(changes.deleted_directories.iter().map(|c| make(Operation::Delete, c)))
        .collect();
    canonical_sort(&mut entries);
    entries
}
