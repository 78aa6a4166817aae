//! Snapshot reconstruction by log replay.

use crate::entry::{HistoryEntry, Operation};
use crate::log::{canonical_sort, parse_log};
use crate::path::is_directory_path;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Hash used in DELETE entries for directories, which carry no content.
pub(crate) const NO_HASH: &str = "-";

/// State of one file in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Content hash.
    pub hash: String,
    /// Time of the entry that produced this state.
    pub timestamp: DateTime<Utc>,
}

/// The state obtained by replaying a history log from empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Live files by path.
    pub files: BTreeMap<String, FileState>,
    /// Live directory paths.
    pub directories: BTreeSet<String>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays entries in order onto an empty snapshot.
    pub fn replay<'a>(entries: impl IntoIterator<Item = &'a HistoryEntry>) -> Self {
        let mut snapshot = Self::new();
        for entry in entries {
            snapshot.apply(entry);
        }
        snapshot
    }

    /// Applies a single entry.
    ///
    /// ADD and MODIFY upsert, DELETE removes, FORCE_CLEAR empties.
    pub fn apply(&mut self, entry: &HistoryEntry) {
        match entry.operation {
            Operation::ForceClear => {
                self.files.clear();
                self.directories.clear();
            }
            Operation::Add | Operation::Modify if entry.is_directory() => {
                self.directories.insert(entry.path.clone());
            }
            Operation::Add | Operation::Modify => {
                self.files.insert(
                    entry.path.clone(),
                    FileState {
                        hash: entry.hash.clone(),
                        timestamp: entry.timestamp,
                    },
                );
            }
            Operation::Delete if entry.is_directory() => {
                self.directories.remove(&entry.path);
            }
            Operation::Delete => {
                self.files.remove(&entry.path);
            }
        }
    }

    /// Returns true if the path is a live file or directory.
    pub fn is_live(&self, path: &str) -> bool {
        if is_directory_path(path) {
            self.directories.contains(path)
        } else {
            self.files.contains_key(path)
        }
    }

    /// Hash of a live file.
    pub fn file_hash(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(|f| f.hash.as_str())
    }

    /// Live files and their hashes, without timestamps.
    pub fn file_hashes(&self) -> BTreeMap<&str, &str> {
        self.files
            .iter()
            .map(|(path, state)| (path.as_str(), state.hash.as_str()))
            .collect()
    }

    /// Returns true if both snapshots hold the same paths and hashes.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.directories == other.directories && self.file_hashes() == other.file_hashes()
    }

    /// Number of live files and directories.
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    /// Returns true if nothing is live.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// ADD entries that rebuild this snapshot from empty, in canonical order.
    ///
    /// Directory entries carry no hash since the snapshot does not keep one.
    pub fn to_entries(&self) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .directories
            .iter()
            .map(|path| HistoryEntry::new(Operation::Add, path, NO_HASH, DateTime::<Utc>::default(), None))
            .chain(self.files.iter().map(|(path, state)| {
                HistoryEntry::new(Operation::Add, path, &state.hash, state.timestamp, None)
            }))
            .collect();
        canonical_sort(&mut entries);
        entries
    }

    /// Entries that turn this snapshot into `target`, in canonical order.
    pub fn delta_to(
        &self,
        target: &Snapshot,
        timestamp: DateTime<Utc>,
        device_tag: Option<&str>,
    ) -> Vec<HistoryEntry> {
        let tag = || device_tag.map(str::to_string);
        let mut entries = Vec::new();

        for path in target.directories.difference(&self.directories) {
            entries.push(HistoryEntry::new(Operation::Add, path, NO_HASH, timestamp, tag()));
        }
        for (path, state) in &target.files {
            match self.files.get(path) {
                None => entries.push(HistoryEntry::new(
                    Operation::Add,
                    path,
                    &state.hash,
                    timestamp,
                    tag(),
                )),
                Some(current) if current.hash != state.hash => entries.push(HistoryEntry::new(
                    Operation::Modify,
                    path,
                    &state.hash,
                    timestamp,
                    tag(),
                )),
                Some(_) => {}
            }
        }
        for (path, state) in &self.files {
            if !target.files.contains_key(path) {
                entries.push(HistoryEntry::new(
                    Operation::Delete,
                    path,
                    &state.hash,
                    timestamp,
                    tag(),
                ));
            }
        }
        for path in self.directories.difference(&target.directories) {
            entries.push(HistoryEntry::new(Operation::Delete, path, NO_HASH, timestamp, tag()));
        }

        canonical_sort(&mut entries);
        entries
    }
}

/// Rebuilds the snapshot described by a log's text.
///
/// Malformed lines are skipped, see [`parse_log`].
pub fn rebuild_snapshot(text: &str) -> Snapshot {
    Snapshot::replay(&parse_log(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::parse_timestamp;
    use crate::log::format_log;

    const LOG: &str = "\
+ | rust/ | d | 2024-01-01T00:00:00.000Z | a
+ | rust/a.snippet | h1 | 2024-01-01T00:00:01.000Z | a
+ | rust/b.snippet | h2 | 2024-01-01T00:00:02.000Z | a
~ | rust/a.snippet | h3 | 2024-01-01T00:00:03.000Z | b
- | rust/b.snippet | h2 | 2024-01-01T00:00:04.000Z | b
";

    #[test]
    fn replay_applies_in_order() {
        let snapshot = rebuild_snapshot(LOG);
        assert_eq!(snapshot.file_hash("rust/a.snippet"), Some("h3"));
        assert_eq!(snapshot.file_hash("rust/b.snippet"), None);
        assert!(snapshot.is_live("rust/"));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn replay_is_order_sensitive() {
        let mut lines: Vec<&str> = LOG.lines().collect();
        lines.swap(3, 1);
        let reordered = lines.join("\n");
        assert_ne!(
            rebuild_snapshot(&reordered).file_hash("rust/a.snippet"),
            rebuild_snapshot(LOG).file_hash("rust/a.snippet")
        );
    }

    #[test]
    fn force_clear_empties() {
        let text = format!("{LOG}! | * | * | 2024-01-02T00:00:00.000Z | a\n+ | go/ | d | 2024-01-02T00:00:01.000Z | a\n");
        let snapshot = rebuild_snapshot(&text);
        assert!(snapshot.files.is_empty());
        assert_eq!(snapshot.directories.len(), 1);
        assert!(snapshot.is_live("go/"));
    }

    #[test]
    fn replaying_a_snapshot_is_idempotent() {
        let once = rebuild_snapshot(LOG);
        let twice = rebuild_snapshot(&format_log(&once.to_entries()));
        assert!(once.same_state(&twice));
        assert_eq!(once.files, twice.files);
    }

    #[test]
    fn delta_reaches_target() {
        let from = rebuild_snapshot(LOG);
        let to = rebuild_snapshot(
            "+ | go/ | d | 2024-01-01T00:00:00.000Z\n+ | go/x/ | d | 2024-01-01T00:00:00.000Z\n+ | go/x/main.snippet | h9 | 2024-01-01T00:00:00.000Z\n+ | rust/ | d | 2024-01-01T00:00:00.000Z\n+ | rust/a.snippet | h1 | 2024-01-01T00:00:00.000Z\n",
        );
        let ts = parse_timestamp("2024-03-01T00:00:00.000Z").unwrap();
        let delta = from.delta_to(&to, ts, Some("dev"));

        let mut applied = from.clone();
        for entry in &delta {
            applied.apply(entry);
        }
        assert!(applied.same_state(&to));

        let ops: Vec<(Operation, &str)> = delta.iter().map(|e| (e.operation, e.path.as_str())).collect();
        assert_eq!(
            ops,
            vec![
                (Operation::Add, "go/"),
                (Operation::Add, "go/x/"),
                (Operation::Add, "go/x/main.snippet"),
                (Operation::Modify, "rust/a.snippet"),
            ]
        );
    }
}
