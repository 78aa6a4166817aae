//! # snipsync Protocol
//!
//! Changelog, snapshot and merge primitives for snipsync.
//!
//! This crate provides:
//! - The snippet/directory item model in both schema variants
//! - Path identity: canonical slash paths and path-derived IDs
//! - The append-only history log, its text format and validation
//! - Snapshot replay, change-set diffing and canonical entry ordering
//! - The cloud metadata fingerprint
//! - Line-level merging and merge-marker handling
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - The history log is append-only except for FORCE_CLEAR
//! - Replaying a log is deterministic and order-sensitive
//! - Canonical order creates parents before children and deletes children
//!   before parents

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changeset;
mod conflict;
mod entry;
mod error;
mod hash;
mod item;
mod log;
mod merge;
mod metadata;
mod path;
mod snapshot;

pub use changeset::{diff, diff_text, to_entries, ChangeSet, FileChange, LocalFile, LocalState};
pub use conflict::{Conflict, ConflictKind, ConflictPolicy, ConflictResolution};
pub use entry::{format_timestamp, parse_timestamp, EntryKey, HistoryEntry, Operation};
pub use error::{ProtocolError, ProtocolResult};
pub use hash::{directory_hash, history_hash, snippet_hash, sync_directory_hash, sync_snippet_hash};
pub use item::{Directory, Library, PathDirectory, PathLibrary, PathSnippet, Snippet};
pub use log::{
    add_entry, canonical_sort, format_log, net_changes, new_entries, next_timestamp, parse_log,
    validate, HistoryLog, NetChanges, ValidationIssue,
};
pub use merge::{
    has_conflict_markers, merge_snippets, render_conflict_markers, MergeConflict, MergeOutcome,
};
pub use metadata::{CloudMetadata, DirectoryMeta, FileMeta, METADATA_VERSION};
pub use path::{
    directory_path, is_directory_path, leaf_name, parent_path, path_depth, path_to_id,
    snippet_name_from_path, snippet_path, PathIndex, SNIPPET_SUFFIX,
};
pub use snapshot::{rebuild_snapshot, FileState, Snapshot};
