//! Applies path-addressed changes to the local store.
//!
//! The local store addresses items by ID and parent link, history entries
//! address them by path. The applier bridges the two: it indexes the store
//! by path once, then turns each change into the matching create, update or
//! delete call. Directories a path implies but the store lacks are created
//! on the way, with IDs derived from their path so every device that
//! learns of the same path picks the same ID.

use crate::error::{SyncError, SyncResult};
use crate::local::LocalStore;
use snipsync_protocol::{
    directory_path, leaf_name, parent_path, path_to_id, snippet_name_from_path, snippet_path,
    Directory, HistoryEntry, Operation, PathIndex, PathSnippet, Snippet,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counts of local mutations made by an applier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Items created.
    pub created: usize,
    /// Items updated.
    pub updated: usize,
    /// Items deleted.
    pub deleted: usize,
}

impl ApplyStats {
    /// Total number of mutations.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Returns true if nothing was mutated.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Applies path-addressed changes to a [`LocalStore`].
pub struct LocalApplier<'a, L: LocalStore + ?Sized> {
    store: &'a L,
    index: PathIndex,
    directories: HashMap<String, Directory>,
    snippets: HashMap<String, Snippet>,
    stats: ApplyStats,
}

impl<'a, L: LocalStore + ?Sized> LocalApplier<'a, L> {
    /// Indexes the store's current content by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn new(store: &'a L) -> SyncResult<Self> {
        let library = store.library()?;
        let index = PathIndex::from_directories(&library.directories);
        let dir_map = library.directory_map();

        let directories = library
            .directories
            .iter()
            .filter_map(|d| directory_path(d, &dir_map).ok().map(|p| (p, d.clone())))
            .collect();

        let mut snippets = HashMap::new();
        for snippet in &library.snippets {
            if let Ok(path) = snippet_path(snippet, &dir_map) {
                snippets.entry(path).or_insert_with(|| snippet.clone());
            }
        }

        Ok(Self {
            store,
            index,
            directories,
            snippets,
            stats: ApplyStats::default(),
        })
    }

    /// Mutations made so far.
    pub fn stats(&self) -> ApplyStats {
        self.stats
    }

    /// The local snippet at a path.
    pub fn snippet_at(&self, path: &str) -> Option<&Snippet> {
        self.snippets.get(path)
    }

    /// The local directory at a path.
    pub fn directory_at(&self, path: &str) -> Option<&Directory> {
        self.directories.get(path)
    }

    /// Paths of every indexed snippet.
    pub fn snippet_paths(&self) -> impl Iterator<Item = &str> {
        self.snippets.keys().map(String::as_str)
    }

    /// Paths of every indexed directory.
    pub fn directory_paths(&self) -> impl Iterator<Item = &str> {
        self.directories.keys().map(String::as_str)
    }

    /// Applies one history entry.
    ///
    /// `objects` must hold the remote object of every snippet ADD or MODIFY.
    ///
    /// # Errors
    ///
    /// Fails if an object is missing, on FORCE_CLEAR (callers turn it into
    /// a snapshot delta first), or if the store refuses a mutation.
    pub fn apply_entry(
        &mut self,
        entry: &HistoryEntry,
        objects: &HashMap<String, PathSnippet>,
    ) -> SyncResult<()> {
        match (entry.operation, entry.is_directory()) {
            (Operation::ForceClear, _) => Err(SyncError::integrity(
                "FORCE_CLEAR cannot be applied entry by entry",
            )),
            (Operation::Add | Operation::Modify, true) => {
                self.ensure_directory(&entry.path, 0).map(|_| ())
            }
            (Operation::Delete, true) => self.delete_directory(&entry.path).map(|_| ()),
            (Operation::Add | Operation::Modify, false) => {
                let object = objects.get(&entry.path).ok_or_else(|| {
                    SyncError::integrity(format!("no object fetched for {}", entry.path))
                })?;
                self.upsert_snippet(object)
            }
            (Operation::Delete, false) => self.delete_snippet(&entry.path).map(|_| ()),
        }
    }

    /// Returns the ID of the directory at `path`, creating it and any
    /// missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses a creation.
    pub fn ensure_directory(&mut self, path: &str, order: i64) -> SyncResult<String> {
        if let Some(id) = self.index.id_for(path) {
            return Ok(id.to_string());
        }
        let parent_id = match parent_path(path) {
            Some(parent) => Some(self.ensure_directory(parent, 0)?),
            None => None,
        };

        let (id, _) = self.index.ensure(path);
        let directory = Directory {
            id: id.clone(),
            name: leaf_name(path).to_string(),
            parent_id,
            order,
        };
        if let Err(err) = self.store.create_directory(directory.clone()) {
            self.index.remove(path);
            return Err(err);
        }
        debug!(%path, %id, "created directory");
        self.directories.insert(path.to_string(), directory);
        self.stats.created += 1;
        Ok(id)
    }

    /// Sets the display order of an existing directory.
    ///
    /// Returns true if the store was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the update.
    pub fn set_directory_order(&mut self, path: &str, order: i64) -> SyncResult<bool> {
        let Some(existing) = self.directories.get(path) else {
            return Ok(false);
        };
        if existing.order == order {
            return Ok(false);
        }
        let updated = Directory {
            order,
            ..existing.clone()
        };
        self.store.update_directory(updated.clone())?;
        self.directories.insert(path.to_string(), updated);
        self.stats.updated += 1;
        Ok(true)
    }

    /// Deletes the directory at `path` if it exists and is empty.
    ///
    /// A directory that still holds items is kept with a warning; the next
    /// push will re-announce it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the deletion.
    pub fn delete_directory(&mut self, path: &str) -> SyncResult<bool> {
        let Some(id) = self.index.id_for(path).map(str::to_string) else {
            return Ok(false);
        };
        let occupied = self.snippets.keys().any(|p| p.starts_with(path))
            || self
                .directories
                .keys()
                .any(|p| p.as_str() != path && p.starts_with(path));
        if occupied {
            warn!(%path, "directory still holds items, keeping it");
            return Ok(false);
        }

        self.store.delete_directory(&id)?;
        debug!(%path, "deleted directory");
        self.index.remove(path);
        self.directories.remove(path);
        self.stats.deleted += 1;
        Ok(true)
    }

    /// Creates or updates the snippet at the object's path.
    ///
    /// An existing snippet keeps its local ID; a new one gets the
    /// path-derived ID. Unchanged snippets are not written.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses a mutation.
    pub fn upsert_snippet(&mut self, object: &PathSnippet) -> SyncResult<()> {
        let path = object.full_path.as_str();
        let parent_id = match parent_path(path) {
            Some(parent) => Some(self.ensure_directory(parent, 0)?),
            None => None,
        };
        let name = snippet_name_from_path(path)
            .unwrap_or(object.name.as_str())
            .to_string();

        match self.snippets.get(path) {
            Some(existing) => {
                let updated = Snippet {
                    id: existing.id.clone(),
                    name,
                    code: object.code.clone(),
                    language: object.language.clone(),
                    parent_id,
                    order: object.order,
                    create_time: existing.create_time,
                };
                if &updated == existing {
                    return Ok(());
                }
                self.store.update_snippet(updated.clone())?;
                debug!(%path, "updated snippet");
                self.snippets.insert(path.to_string(), updated);
                self.stats.updated += 1;
            }
            None => {
                let created = Snippet {
                    id: path_to_id(path),
                    name,
                    code: object.code.clone(),
                    language: object.language.clone(),
                    parent_id,
                    order: object.order,
                    create_time: object.create_time,
                };
                self.store.create_snippet(created.clone())?;
                debug!(%path, "created snippet");
                self.snippets.insert(path.to_string(), created);
                self.stats.created += 1;
            }
        }
        Ok(())
    }

    /// Deletes the snippet at `path` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the deletion.
    pub fn delete_snippet(&mut self, path: &str) -> SyncResult<bool> {
        let Some(existing) = self.snippets.get(path) else {
            return Ok(false);
        };
        self.store.delete_snippet(&existing.id)?;
        debug!(%path, "deleted snippet");
        self.snippets.remove(path);
        self.stats.deleted += 1;
        Ok(true)
    }
}
