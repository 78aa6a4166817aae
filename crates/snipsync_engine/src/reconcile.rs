//! Minimal-delta reconciliation of the local store against a target library.
//!
//! Used after a merge was finalized outside the engine: the working tree is
//! the truth, and the store is brought in line with it by touching only the
//! items that differ.

use crate::applier::LocalApplier;
use crate::error::SyncResult;
use crate::local::LocalStore;
use snipsync_protocol::{parent_path, path_depth, PathLibrary};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Snippets created.
    pub snippets_added: usize,
    /// Snippets whose content, language or order changed.
    pub snippets_updated: usize,
    /// Snippets deleted.
    pub snippets_removed: usize,
    /// Directories created, including implied parents.
    pub directories_added: usize,
    /// Directories whose order changed.
    pub directories_updated: usize,
    /// Directories deleted.
    pub directories_removed: usize,
}

impl ReconcileStats {
    /// Total number of store mutations.
    pub fn total(&self) -> usize {
        self.snippets_added
            + self.snippets_updated
            + self.snippets_removed
            + self.directories_added
            + self.directories_updated
            + self.directories_removed
    }

    /// Returns true if the store already matched.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Brings `store` in line with `target`, touching only what differs.
///
/// Parents are created before children and children are deleted before
/// parents. The store's cache is cleared only when something changed.
///
/// # Errors
///
/// Returns an error if the store cannot be read or refuses a mutation.
pub fn reconcile<L: LocalStore + ?Sized>(store: &L, target: &PathLibrary) -> SyncResult<ReconcileStats> {
    let mut applier = LocalApplier::new(store)?;
    let mut stats = ReconcileStats::default();

    let mut wanted_dirs: HashMap<String, i64> = target
        .directories
        .iter()
        .map(|d| (d.full_path.clone(), d.order))
        .collect();
    let implied: Vec<String> = target
        .directories
        .iter()
        .map(|d| d.full_path.as_str())
        .chain(target.snippets.iter().map(|s| s.full_path.as_str()))
        .flat_map(ancestors)
        .collect();
    for path in implied {
        wanted_dirs.entry(path).or_insert(0);
    }

    let before: BTreeSet<String> = applier.directory_paths().map(str::to_string).collect();
    let mut ordered: Vec<(&String, &i64)> = wanted_dirs.iter().collect();
    ordered.sort_by(|a, b| path_depth(a.0).cmp(&path_depth(b.0)).then(a.0.cmp(b.0)));
    for (path, order) in ordered {
        if before.contains(path.as_str()) {
            if applier.set_directory_order(path, *order)? {
                stats.directories_updated += 1;
            }
        } else if applier.directory_at(path).is_none() {
            applier.ensure_directory(path, *order)?;
        }
    }
    stats.directories_added = applier
        .directory_paths()
        .filter(|p| !before.contains(*p))
        .count();

    let wanted_snippets: BTreeSet<&str> =
        target.snippets.iter().map(|s| s.full_path.as_str()).collect();
    for object in &target.snippets {
        let existed = applier.snippet_at(&object.full_path).is_some();
        let updated_before = applier.stats().updated;
        applier.upsert_snippet(object)?;
        if !existed {
            stats.snippets_added += 1;
        } else if applier.stats().updated > updated_before {
            stats.snippets_updated += 1;
        }
    }

    let stale: Vec<String> = applier
        .snippet_paths()
        .filter(|p| !wanted_snippets.contains(p))
        .map(str::to_string)
        .collect();
    for path in stale {
        if applier.delete_snippet(&path)? {
            stats.snippets_removed += 1;
        }
    }

    let mut stale_dirs: Vec<String> = applier
        .directory_paths()
        .filter(|p| !wanted_dirs.contains_key(*p))
        .map(str::to_string)
        .collect();
    stale_dirs.sort_by(|a, b| path_depth(b).cmp(&path_depth(a)).then(a.cmp(b)));
    for path in stale_dirs {
        if applier.delete_directory(&path)? {
            stats.directories_removed += 1;
        }
    }

    if !stats.is_empty() {
        store.clear_cache()?;
    }
    debug!(?stats, "reconciled local store");
    Ok(stats)
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut parent = parent_path(path);
    while let Some(dir) = parent {
        out.push(dir.to_string());
        parent = parent_path(dir);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStore;
    use snipsync_protocol::{PathDirectory, PathSnippet};

    fn snippet(path: &str, code: &str) -> PathSnippet {
        PathSnippet {
            full_path: path.into(),
            name: String::new(),
            code: code.into(),
            language: "rust".into(),
            order: 0,
            create_time: 0,
        }
    }

    fn directory(path: &str, order: i64) -> PathDirectory {
        PathDirectory {
            full_path: path.into(),
            name: String::new(),
            order,
        }
    }

    #[test]
    fn builds_from_empty() {
        let store = MemoryLocalStore::new();
        let target = PathLibrary {
            snippets: vec![snippet("a/b/x.snippet", "1"), snippet("y.snippet", "2")],
            directories: vec![directory("a/", 3)],
        };

        let stats = reconcile(&store, &target).unwrap();
        assert_eq!(stats.snippets_added, 2);
        assert_eq!(stats.directories_added, 2);
        assert_eq!(store.cache_clears(), 1);

        let library = store.library().unwrap();
        assert_eq!(library.to_path_library().unwrap().snippets.len(), 2);
        let a = library.directories.iter().find(|d| d.name == "a").unwrap();
        assert_eq!(a.order, 3);
    }

    #[test]
    fn matching_store_is_untouched() {
        let store = MemoryLocalStore::new();
        let target = PathLibrary {
            snippets: vec![snippet("a/x.snippet", "1")],
            directories: vec![directory("a/", 0)],
        };
        reconcile(&store, &target).unwrap();
        let mutations = store.mutations();

        let stats = reconcile(&store, &target).unwrap();
        assert!(stats.is_empty());
        assert_eq!(store.mutations(), mutations);
        assert_eq!(store.cache_clears(), 1);
    }

    #[test]
    fn applies_only_the_delta() {
        let store = MemoryLocalStore::new();
        reconcile(
            &store,
            &PathLibrary {
                snippets: vec![
                    snippet("a/keep.snippet", "same"),
                    snippet("a/edit.snippet", "old"),
                    snippet("old/gone.snippet", "x"),
                ],
                directories: vec![directory("a/", 0), directory("old/", 0)],
            },
        )
        .unwrap();
        let before = store.mutations();

        let stats = reconcile(
            &store,
            &PathLibrary {
                snippets: vec![
                    snippet("a/keep.snippet", "same"),
                    snippet("a/edit.snippet", "new"),
                    snippet("a/fresh.snippet", "n"),
                ],
                directories: vec![directory("a/", 0)],
            },
        )
        .unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                snippets_added: 1,
                snippets_updated: 1,
                snippets_removed: 1,
                directories_added: 0,
                directories_updated: 0,
                directories_removed: 1,
            }
        );
        assert_eq!(store.mutations() - before, 4);
    }
}
