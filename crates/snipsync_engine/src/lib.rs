//! # Snipsync Engine
//!
//! Sync state machine and engine for snippet libraries.
//!
//! This crate provides:
//! - The sync engine (initialize, push, pull, resolve)
//! - Force reset and import of the remote history
//! - Conflict resolution by merge, decider and fallback policy
//! - Persisted baseline and sync status
//! - Minimal-delta reconciliation of the local store
//! - A merge-marker watcher for repository-backed remotes
//!
//! ## Architecture
//!
//! Each device keeps a **baseline**: the remote log as it was after its
//! last successful cycle. A cycle compares two things:
//! 1. The local library against the baseline's replayed snapshot
//! 2. The remote metadata hash against the baseline's hash
//!
//! Only local changes means push, only remote changes means pull, both
//! means resolve.
//!
//! ## Key Invariants
//!
//! - Objects are written before the log that references them
//! - The log is written before the metadata that describes it
//! - Remote objects are fetched before the first local mutation
//! - One cycle at a time per engine
//! - A cycle never returns an error across the sync boundary

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod clock;
mod config;
mod error;
mod listener;
mod local;
mod persist;
mod reconcile;
mod state;
mod watcher;

pub use applier::{ApplyStats, LocalApplier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    SyncConfig, DEFAULT_HISTORY_KEY, DEFAULT_METADATA_KEY, DEFAULT_SNIPPET_PREFIX,
};
pub use error::{ErrorCategory, SyncError, SyncResult};
pub use listener::{ConflictDecider, EditingFlag, EditingGuard, SyncListener};
pub use local::{LocalStore, MemoryLocalStore};
pub use persist::{FileStateStore, MemoryStateStore, StateStore, SyncStatus};
pub use reconcile::{reconcile, ReconcileStats};
pub use state::{SyncAction, SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use watcher::{ConflictWatcher, IgnoreReason, MergeWorkspace, WatchOutcome, WorkspaceEvent};
