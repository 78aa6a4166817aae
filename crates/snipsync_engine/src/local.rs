//! The local item store the engine syncs.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use snipsync_protocol::{Directory, Library, Snippet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Capability interface over the local snippet store.
///
/// Implementations decide how items are persisted; the engine only reads
/// everything and applies single-item mutations.
pub trait LocalStore: Send + Sync {
    /// Returns every snippet.
    fn get_all_snippets(&self) -> SyncResult<Vec<Snippet>>;

    /// Returns every directory.
    fn get_all_directories(&self) -> SyncResult<Vec<Directory>>;

    /// Creates a snippet. Fails if the ID is taken.
    fn create_snippet(&self, snippet: Snippet) -> SyncResult<()>;

    /// Replaces the snippet with the same ID.
    fn update_snippet(&self, snippet: Snippet) -> SyncResult<()>;

    /// Deletes a snippet. Deleting an unknown ID succeeds.
    fn delete_snippet(&self, id: &str) -> SyncResult<()>;

    /// Creates a directory. Fails if the ID is taken.
    fn create_directory(&self, directory: Directory) -> SyncResult<()>;

    /// Replaces the directory with the same ID.
    fn update_directory(&self, directory: Directory) -> SyncResult<()>;

    /// Deletes a directory. Deleting an unknown ID succeeds.
    fn delete_directory(&self, id: &str) -> SyncResult<()>;

    /// Drops any cached views so the next read sees the mutations.
    fn clear_cache(&self) -> SyncResult<()>;

    /// Returns the whole library.
    fn library(&self) -> SyncResult<Library> {
        Ok(Library::new(
            self.get_all_snippets()?,
            self.get_all_directories()?,
        ))
    }
}

impl<S: LocalStore + ?Sized> LocalStore for Arc<S> {
    fn get_all_snippets(&self) -> SyncResult<Vec<Snippet>> {
        (**self).get_all_snippets()
    }

    fn get_all_directories(&self) -> SyncResult<Vec<Directory>> {
        (**self).get_all_directories()
    }

    fn create_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        (**self).create_snippet(snippet)
    }

    fn update_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        (**self).update_snippet(snippet)
    }

    fn delete_snippet(&self, id: &str) -> SyncResult<()> {
        (**self).delete_snippet(id)
    }

    fn create_directory(&self, directory: Directory) -> SyncResult<()> {
        (**self).create_directory(directory)
    }

    fn update_directory(&self, directory: Directory) -> SyncResult<()> {
        (**self).update_directory(directory)
    }

    fn delete_directory(&self, id: &str) -> SyncResult<()> {
        (**self).delete_directory(id)
    }

    fn clear_cache(&self) -> SyncResult<()> {
        (**self).clear_cache()
    }

    fn library(&self) -> SyncResult<Library> {
        (**self).library()
    }
}

/// An in-memory local store.
///
/// Items are kept sorted by ID so reads are deterministic. Every successful
/// mutation bumps a counter tests can use to assert minimal updates.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    snippets: RwLock<BTreeMap<String, Snippet>>,
    directories: RwLock<BTreeMap<String, Directory>>,
    mutations: AtomicUsize,
    cache_clears: AtomicUsize,
}

impl MemoryLocalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a library.
    pub fn with_library(library: Library) -> Self {
        let store = Self::new();
        store.replace(library);
        store
    }

    /// Replaces the whole content without counting mutations.
    pub fn replace(&self, library: Library) {
        *self.snippets.write() = library
            .snippets
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        *self.directories.write() = library
            .directories
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
    }

    /// Looks up a snippet by name and parent.
    pub fn find_snippet(&self, name: &str, parent_id: Option<&str>) -> Option<Snippet> {
        self.snippets
            .read()
            .values()
            .find(|s| s.name == name && s.parent_id.as_deref() == parent_id)
            .cloned()
    }

    /// Number of successful mutations so far.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of cache clears so far.
    pub fn cache_clears(&self) -> usize {
        self.cache_clears.load(Ordering::SeqCst)
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

impl LocalStore for MemoryLocalStore {
    fn get_all_snippets(&self) -> SyncResult<Vec<Snippet>> {
        Ok(self.snippets.read().values().cloned().collect())
    }

    fn get_all_directories(&self) -> SyncResult<Vec<Directory>> {
        Ok(self.directories.read().values().cloned().collect())
    }

    fn create_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        let mut snippets = self.snippets.write();
        if snippets.contains_key(&snippet.id) {
            return Err(SyncError::local(format!("snippet {} already exists", snippet.id)));
        }
        snippets.insert(snippet.id.clone(), snippet);
        self.mutated();
        Ok(())
    }

    fn update_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        let mut snippets = self.snippets.write();
        match snippets.get_mut(&snippet.id) {
            Some(existing) => {
                *existing = snippet;
                self.mutated();
                Ok(())
            }
            None => Err(SyncError::local(format!("snippet {} does not exist", snippet.id))),
        }
    }

    fn delete_snippet(&self, id: &str) -> SyncResult<()> {
        if self.snippets.write().remove(id).is_some() {
            self.mutated();
        }
        Ok(())
    }

    fn create_directory(&self, directory: Directory) -> SyncResult<()> {
        let mut directories = self.directories.write();
        if directories.contains_key(&directory.id) {
            return Err(SyncError::local(format!(
                "directory {} already exists",
                directory.id
            )));
        }
        directories.insert(directory.id.clone(), directory);
        self.mutated();
        Ok(())
    }

    fn update_directory(&self, directory: Directory) -> SyncResult<()> {
        let mut directories = self.directories.write();
        match directories.get_mut(&directory.id) {
            Some(existing) => {
                *existing = directory;
                self.mutated();
                Ok(())
            }
            None => Err(SyncError::local(format!(
                "directory {} does not exist",
                directory.id
            ))),
        }
    }

    fn delete_directory(&self, id: &str) -> SyncResult<()> {
        if self.directories.write().remove(id).is_some() {
            self.mutated();
        }
        Ok(())
    }

    fn clear_cache(&self) -> SyncResult<()> {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
