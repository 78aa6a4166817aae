//! Collaborators the engine notifies or consults.

use crate::error::SyncError;
use crate::state::SyncCycleResult;
use snipsync_protocol::{Conflict, ConflictResolution, PathSnippet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives sync notifications. Every method defaults to doing nothing.
pub trait SyncListener: Send + Sync {
    /// A cycle finished successfully.
    fn on_sync_complete(&self, _result: &SyncCycleResult) {}

    /// A cycle failed.
    fn on_sync_error(&self, _error: &SyncError) {}

    /// Conflicts were detected, after they were resolved or found blocking.
    fn on_conflict_detected(&self, _conflicts: &[Conflict]) {}

    /// The local store was mutated and views should be refreshed.
    fn on_refresh_view(&self) {}
}

/// Tells the engine whether the user is editing right now.
pub trait EditingGuard: Send + Sync {
    /// Returns true while a sync could clobber in-progress edits.
    fn is_editing(&self) -> bool;
}

/// A settable [`EditingGuard`].
#[derive(Debug, Default)]
pub struct EditingFlag(AtomicBool);

impl EditingFlag {
    /// Creates a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the flag.
    pub fn set(&self, editing: bool) {
        self.0.store(editing, Ordering::SeqCst);
    }
}

impl EditingGuard for EditingFlag {
    fn is_editing(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Supplies a human decision for a conflict the merge could not settle.
pub trait ConflictDecider: Send + Sync {
    /// Picks [`ConflictResolution::KeepLocal`] or
    /// [`ConflictResolution::AcceptRemote`], or `None` to defer to the
    /// configured policy.
    ///
    /// `local` and `remote` are `None` on the side that deleted the item.
    fn decide(
        &self,
        conflict: &Conflict,
        local: Option<&PathSnippet>,
        remote: Option<&PathSnippet>,
    ) -> Option<ConflictResolution>;
}
