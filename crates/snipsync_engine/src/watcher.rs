//! Merge-marker watcher for version-controlled working copies.
//!
//! When the remote is a repository, conflicts show up as marker text in the
//! working files and the user resolves them in an editor. The watcher follows
//! editor events, keeps track of which tracked files still hold markers, and
//! once none do while a merge is pending it stages, commits, pushes and
//! reconciles the working tree back into the local store.
//!
//! Its own corrective actions make the editor emit more save and close
//! events. A cooldown after each finalization and an explicit enable latch
//! keep those from triggering it again.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::local::LocalStore;
use crate::reconcile::{reconcile, ReconcileStats};
use chrono::{DateTime, Duration, Utc};
use snipsync_protocol::{has_conflict_markers, PathLibrary};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

const MERGE_MESSAGE: &str = "Merge remote snippet changes";

/// How far an interrupted finalization got past its commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unfinished {
    /// Committed, not yet pushed.
    Push,
    /// Pushed, the local store not yet reconciled.
    Reconcile,
}

/// The version-control operations the watcher needs.
pub trait MergeWorkspace {
    /// Paths of tracked files.
    fn tracked_files(&self) -> SyncResult<Vec<String>>;

    /// Current working-copy text of a tracked file.
    fn read_file(&self, path: &str) -> SyncResult<String>;

    /// Whether a merge is in progress and awaiting a commit.
    fn is_merge_pending(&self) -> SyncResult<bool>;

    /// Stages every tracked file.
    fn stage_all(&self) -> SyncResult<()>;

    /// Concludes the pending merge with a commit.
    fn commit_merge(&self, message: &str) -> SyncResult<()>;

    /// Publishes the merge commit.
    fn push(&self) -> SyncResult<()>;

    /// Reads the whole working tree as a library.
    fn load_working_tree(&self) -> SyncResult<PathLibrary>;
}

impl<W: MergeWorkspace + ?Sized> MergeWorkspace for &W {
    fn tracked_files(&self) -> SyncResult<Vec<String>> {
        (**self).tracked_files()
    }

    fn read_file(&self, path: &str) -> SyncResult<String> {
        (**self).read_file(path)
    }

    fn is_merge_pending(&self) -> SyncResult<bool> {
        (**self).is_merge_pending()
    }

    fn stage_all(&self) -> SyncResult<()> {
        (**self).stage_all()
    }

    fn commit_merge(&self, message: &str) -> SyncResult<()> {
        (**self).commit_merge(message)
    }

    fn push(&self) -> SyncResult<()> {
        (**self).push()
    }

    fn load_working_tree(&self) -> SyncResult<PathLibrary> {
        (**self).load_working_tree()
    }
}

/// An editor lifecycle event on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// A file was opened.
    Opened(String),
    /// A file was saved.
    Saved(String),
    /// A file was closed.
    Closed(String),
}

impl WorkspaceEvent {
    /// The file the event concerns.
    pub fn path(&self) -> &str {
        match self {
            WorkspaceEvent::Opened(p) | WorkspaceEvent::Saved(p) | WorkspaceEvent::Closed(p) => p,
        }
    }
}

/// Why an event was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The watcher is disabled.
    Disabled,
    /// A finalization happened too recently.
    CoolingDown,
    /// The file is not tracked.
    Untracked,
}

/// What the watcher did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Nothing.
    Ignored(IgnoreReason),
    /// The marker set was updated; `conflicted` files still hold markers.
    Tracking {
        /// Files still holding markers.
        conflicted: usize,
    },
    /// The merge was committed, pushed and reconciled.
    Finalized(ReconcileStats),
}

/// Follows editor events until a pending merge is fully resolved.
///
/// The watcher is a plain state machine driven through `&mut self`, so a
/// finalization can never be re-entered while it runs.
pub struct ConflictWatcher<W: MergeWorkspace, L: LocalStore> {
    workspace: W,
    local: L,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    enabled: bool,
    cooldown_until: Option<DateTime<Utc>>,
    conflicted: BTreeSet<String>,
    unfinished: Option<Unfinished>,
}

impl<W: MergeWorkspace, L: LocalStore> ConflictWatcher<W, L> {
    /// Creates an enabled watcher with the system clock.
    pub fn new(workspace: W, local: L, cooldown: std::time::Duration) -> Self {
        Self {
            workspace,
            local,
            clock: Arc::new(SystemClock),
            cooldown: Duration::from_std(cooldown).unwrap_or_else(|_| Duration::seconds(2)),
            enabled: true,
            cooldown_until: None,
            conflicted: BTreeSet::new(),
            unfinished: None,
        }
    }

    /// Creates a watcher using the cooldown from `config`.
    pub fn from_config(workspace: W, local: L, config: &SyncConfig) -> Self {
        Self::new(workspace, local, config.watcher_cooldown)
    }

    /// Sets the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The workspace.
    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    /// Resumes reacting to events.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stops reacting to events until [`enable`](Self::enable) is called.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns true if the watcher reacts to events.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true if a merge was committed but its push or reconcile
    /// has not succeeded yet.
    pub fn has_unfinished_merge(&self) -> bool {
        self.unfinished.is_some()
    }

    /// Files currently known to hold markers.
    pub fn conflicted_files(&self) -> impl Iterator<Item = &str> {
        self.conflicted.iter().map(String::as_str)
    }

    /// Re-reads every tracked file and returns how many hold markers.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace cannot be read.
    pub fn scan(&mut self) -> SyncResult<usize> {
        self.conflicted.clear();
        for path in self.workspace.tracked_files()? {
            if has_conflict_markers(&self.workspace.read_file(&path)?) {
                self.conflicted.insert(path);
            }
        }
        Ok(self.conflicted.len())
    }

    /// Handles one editor event.
    ///
    /// Saves and closes may finalize the merge; opens only update tracking.
    ///
    /// # Errors
    ///
    /// Returns an error if a workspace or store operation fails. A later
    /// save or close resumes from the step that failed; a committed merge is
    /// never committed twice.
    pub fn handle(&mut self, event: &WorkspaceEvent) -> SyncResult<WatchOutcome> {
        if !self.enabled {
            return Ok(WatchOutcome::Ignored(IgnoreReason::Disabled));
        }
        if self.cooldown_until.is_some_and(|until| self.clock.now() < until) {
            debug!(path = event.path(), "event during cooldown");
            return Ok(WatchOutcome::Ignored(IgnoreReason::CoolingDown));
        }

        let path = event.path();
        if !self.workspace.tracked_files()?.iter().any(|p| p == path) {
            return Ok(WatchOutcome::Ignored(IgnoreReason::Untracked));
        }
        if has_conflict_markers(&self.workspace.read_file(path)?) {
            self.conflicted.insert(path.to_string());
        } else {
            self.conflicted.remove(path);
        }

        let can_finalize = !matches!(event, WorkspaceEvent::Opened(_));
        if can_finalize
            && self.conflicted.is_empty()
            && (self.unfinished.is_some() || self.workspace.is_merge_pending()?)
        {
            return self.finalize().map(WatchOutcome::Finalized);
        }
        Ok(WatchOutcome::Tracking {
            conflicted: self.conflicted.len(),
        })
    }

    fn finalize(&mut self) -> SyncResult<ReconcileStats> {
        if self.unfinished.is_none() {
            self.workspace.stage_all()?;
            self.workspace.commit_merge(MERGE_MESSAGE)?;
            self.unfinished = Some(Unfinished::Push);
        }
        if self.unfinished == Some(Unfinished::Push) {
            self.workspace.push()?;
            self.unfinished = Some(Unfinished::Reconcile);
        }
        let tree = self.workspace.load_working_tree()?;
        let stats = reconcile(&self.local, &tree)?;
        self.unfinished = None;
        self.cooldown_until = Some(self.clock.now() + self.cooldown);
        info!(changed = stats.total(), "merge finalized");
        Ok(stats)
    }
}
