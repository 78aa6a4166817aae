//! Sync engine state machine.

use crate::applier::{ApplyStats, LocalApplier};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{ErrorCategory, SyncError, SyncResult};
use crate::listener::{ConflictDecider, EditingGuard, SyncListener};
use crate::local::LocalStore;
use crate::persist::{MemoryStateStore, StateStore, SyncStatus};
use parking_lot::{Mutex, RwLock};
use snipsync_protocol::{
    canonical_sort, diff, merge_snippets, net_changes, new_entries, next_timestamp,
    sync_snippet_hash, to_entries, ChangeSet, CloudMetadata, Conflict, ConflictResolution,
    HistoryEntry, HistoryLog, Library, LocalState, MergeOutcome, Operation, PathSnippet, Snapshot,
};
use snipsync_store::ObjectStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Seeding an empty remote.
    Initializing,
    /// Publishing local changes.
    Pushing,
    /// Importing remote changes.
    Pulling,
    /// Reconciling changes made on both sides.
    Resolving,
    /// Replacing remote history with the local library.
    Resetting,
    /// Replacing the local library with remote history.
    Importing,
}

impl SyncState {
    /// Returns true if a cycle is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    /// The remote was empty and got seeded.
    Initialized,
    /// Neither side changed.
    UpToDate,
    /// Local changes were published.
    Pushed,
    /// Remote changes were imported.
    Pulled,
    /// Changes on both sides were reconciled.
    Resolved,
    /// Remote history was replaced.
    ForceReset,
    /// The local library was replaced.
    Imported,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of entries appended to the remote log.
    pub entries_pushed: u64,
    /// Total number of remote entries applied locally.
    pub entries_pulled: u64,
    /// Total number of conflicts encountered.
    pub conflicts_encountered: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
///
/// Cycles never return `Err`; failures are reported here with a category
/// and a message meant for the user.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleResult {
    /// What the cycle did, `None` if it failed.
    pub action: Option<SyncAction>,
    /// Entries appended to the remote log.
    pub pushed: usize,
    /// Remote entries applied locally.
    pub pulled: usize,
    /// Conflicts detected, resolved or not.
    pub conflicts: Vec<Conflict>,
    /// Whether the cycle succeeded.
    pub success: bool,
    /// Failure class.
    pub error_category: Option<ErrorCategory>,
    /// Human-readable outcome.
    pub message: String,
    /// Duration of the cycle.
    #[serde(skip)]
    pub duration: Duration,
}

impl SyncCycleResult {
    fn succeeded(outcome: Outcome, conflicts: Vec<Conflict>, duration: Duration) -> Self {
        let message = match outcome.action {
            SyncAction::Initialized => format!("Remote initialized with {} entries.", outcome.pushed),
            SyncAction::UpToDate => "Already up to date.".to_string(),
            SyncAction::Pushed => format!("Pushed {} change(s).", outcome.pushed),
            SyncAction::Pulled => format!("Pulled {} change(s).", outcome.pulled),
            SyncAction::Resolved => format!(
                "Pulled {} and pushed {} change(s), {} conflict(s) resolved.",
                outcome.pulled,
                outcome.pushed,
                conflicts.len()
            ),
            SyncAction::ForceReset => {
                format!("Remote history reset with {} entries.", outcome.pushed)
            }
            SyncAction::Imported => format!("Imported {} item(s) from remote.", outcome.pulled),
        };
        Self {
            action: Some(outcome.action),
            pushed: outcome.pushed,
            pulled: outcome.pulled,
            conflicts,
            success: true,
            error_category: None,
            message,
            duration,
        }
    }

    fn failed(error: &SyncError, conflicts: Vec<Conflict>, duration: Duration) -> Self {
        Self {
            action: None,
            pushed: 0,
            pulled: 0,
            conflicts,
            success: false,
            error_category: Some(error.category()),
            message: error.user_message(),
            duration,
        }
    }
}

/// What a cycle body reports back.
struct Outcome {
    action: SyncAction,
    pushed: usize,
    pulled: usize,
}

impl Outcome {
    fn new(action: SyncAction) -> Self {
        Self {
            action,
            pushed: 0,
            pulled: 0,
        }
    }
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The sync engine keeps a local library and a remote object store in step.
///
/// Each cycle compares the library against the last-synced baseline log and
/// the remote metadata against the baseline's hash, then initializes, pushes,
/// pulls or resolves. One cycle runs at a time per engine.
pub struct SyncEngine<R: ObjectStore, L: LocalStore> {
    config: SyncConfig,
    remote: R,
    local: L,
    state_store: Box<dyn StateStore>,
    clock: Arc<dyn Clock>,
    listeners: Vec<Arc<dyn SyncListener>>,
    editing: Option<Arc<dyn EditingGuard>>,
    decider: Option<Arc<dyn ConflictDecider>>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
    cycle_conflicts: Mutex<Vec<Conflict>>,
}

impl<R: ObjectStore, L: LocalStore> SyncEngine<R, L> {
    /// Creates an engine with in-memory state and the system clock.
    pub fn new(config: SyncConfig, remote: R, local: L) -> Self {
        Self {
            config,
            remote,
            local,
            state_store: Box::new(MemoryStateStore::new()),
            clock: Arc::new(SystemClock),
            listeners: Vec::new(),
            editing: None,
            decider: None,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
            cycle_conflicts: Mutex::new(Vec::new()),
        }
    }

    /// Sets where the baseline and status are persisted.
    pub fn with_state_store(mut self, store: impl StateStore + 'static) -> Self {
        self.state_store = Box::new(store);
        self
    }

    /// Sets the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a notification listener.
    pub fn with_listener(mut self, listener: Arc<dyn SyncListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the "user is editing" guard.
    pub fn with_editing_guard(mut self, guard: Arc<dyn EditingGuard>) -> Self {
        self.editing = Some(guard);
        self
    }

    /// Sets the conflict decider consulted before the fallback policy.
    pub fn with_decider(mut self, decider: Arc<dyn ConflictDecider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The remote object store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The local item store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The persisted status record.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be read.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        self.state_store.load_status()
    }

    /// The last-synced baseline log, empty if this device never synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline cannot be read.
    pub fn baseline(&self) -> SyncResult<HistoryLog> {
        Ok(HistoryLog::parse(
            &self.state_store.load_baseline()?.unwrap_or_default(),
        ))
    }

    /// Downloads the remote log, `None` if the remote was never initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the log is not UTF-8.
    pub fn fetch_remote_log(&self) -> SyncResult<Option<HistoryLog>> {
        match self.remote.get(&self.config.history_key)? {
            Some(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| SyncError::integrity("remote history log is not UTF-8"))?;
                Ok(Some(HistoryLog::parse(&text)))
            }
            None => Ok(None),
        }
    }

    /// Downloads the remote metadata, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or decoding fails.
    pub fn fetch_metadata(&self) -> SyncResult<Option<CloudMetadata>> {
        match self.remote.get(&self.config.metadata_key)? {
            Some(bytes) => Ok(Some(CloudMetadata::from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Local changes since the baseline.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store or baseline cannot be read.
    pub fn local_changes(&self) -> SyncResult<ChangeSet> {
        let local = LocalState::from_library(&self.local.library()?);
        Ok(diff(&local, &self.baseline()?.snapshot()))
    }

    /// Whether the remote moved since the baseline, `None` if the remote has
    /// no metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata or baseline cannot be read.
    pub fn remote_changed(&self) -> SyncResult<Option<bool>> {
        let baseline = self.baseline()?;
        Ok(self
            .fetch_metadata()?
            .map(|meta| !meta.describes(baseline.text())))
    }

    /// Runs one cycle against the local store's current library.
    pub fn sync(&self) -> SyncCycleResult {
        match self.local.library() {
            Ok(library) => self.perform_sync(&library),
            Err(err) => self.run(|_| Err(err)),
        }
    }

    /// Runs one cycle with `current` as the live library.
    pub fn perform_sync(&self, current: &Library) -> SyncCycleResult {
        self.run(|engine| engine.cycle(current))
    }

    /// Deletes every remote object, writes a FORCE_CLEAR sentinel and
    /// reseeds the remote from the local library.
    ///
    /// Other devices see the sentinel on their next pull and move their
    /// library to the new remote state.
    pub fn force_reset(&self) -> SyncCycleResult {
        self.run(|engine| {
            let library = engine.local.library()?;
            engine.reset_remote(&library)
        })
    }

    /// Wipes the local library and adopts the remote log verbatim.
    pub fn abandon_local_and_import(&self) -> SyncCycleResult {
        self.run(|engine| engine.import_remote())
    }

    fn run(&self, body: impl FnOnce(&Self) -> SyncResult<Outcome>) -> SyncCycleResult {
        let start = Instant::now();
        if self.editing.as_ref().is_some_and(|guard| guard.is_editing()) {
            debug!("sync skipped while the user is editing");
            return SyncCycleResult::failed(&SyncError::UserEditing, Vec::new(), start.elapsed());
        }
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!("sync skipped, another cycle is running");
            return SyncCycleResult::failed(&SyncError::AlreadySyncing, Vec::new(), start.elapsed());
        };

        self.cycle_conflicts.lock().clear();
        let outcome = self.mark_syncing().and_then(|()| body(self));
        self.set_state(SyncState::Idle);
        let conflicts = std::mem::take(&mut *self.cycle_conflicts.lock());

        match outcome {
            Ok(outcome) => {
                self.finish_status(None);
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.entries_pushed += outcome.pushed as u64;
                    stats.entries_pulled += outcome.pulled as u64;
                    stats.conflicts_encountered += conflicts.len() as u64;
                    stats.last_error = None;
                }
                info!(action = ?outcome.action, pushed = outcome.pushed, pulled = outcome.pulled, "sync cycle complete");
                let result = SyncCycleResult::succeeded(outcome, conflicts, start.elapsed());
                self.notify(|l| l.on_sync_complete(&result));
                result
            }
            Err(err) => {
                warn!(error = %err, category = %err.category(), "sync cycle failed");
                self.finish_status(Some(err.to_string()));
                {
                    let mut stats = self.stats.write();
                    stats.conflicts_encountered += conflicts.len() as u64;
                    stats.last_error = Some(err.to_string());
                }
                self.notify(|l| l.on_sync_error(&err));
                SyncCycleResult::failed(&err, conflicts, start.elapsed())
            }
        }
    }

    fn mark_syncing(&self) -> SyncResult<()> {
        let mut status = self.state_store.load_status()?;
        if status.is_syncing {
            warn!("previous sync did not finish cleanly");
        }
        status.is_syncing = true;
        self.state_store.save_status(&status)
    }

    fn finish_status(&self, error: Option<String>) {
        let mut status = self.state_store.load_status().unwrap_or_default();
        status.is_syncing = false;
        if error.is_none() {
            status.last_sync_timestamp = Some(self.clock.now());
        }
        status.last_error = error;
        if let Err(err) = self.state_store.save_status(&status) {
            warn!(error = %err, "failed to persist sync status");
        }
    }

    fn notify(&self, f: impl Fn(&dyn SyncListener)) {
        for listener in &self.listeners {
            f(listener.as_ref());
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn tag(&self) -> Option<&str> {
        Some(self.config.device_tag.as_str())
    }

    fn cycle(&self, current: &Library) -> SyncResult<Outcome> {
        self.config.validate()?;
        let local = LocalState::from_library(current);

        let metadata = match self.fetch_metadata()? {
            Some(metadata) => metadata,
            None => match self.fetch_remote_log()? {
                Some(log) if !log.is_empty() => {
                    warn!("remote log has no metadata, rebuilding it");
                    let metadata = CloudMetadata::from_log(log.text(), self.clock.now());
                    self.remote
                        .put(&self.config.metadata_key, &metadata.to_json()?)?;
                    metadata
                }
                _ => return self.initialize(&local),
            },
        };

        let baseline = self.baseline()?;
        let changes = diff(&local, &baseline.snapshot());
        if changes.is_empty() && metadata.describes(baseline.text()) {
            debug!("nothing changed on either side");
            return Ok(Outcome::new(SyncAction::UpToDate));
        }

        let remote_log = self.fetch_remote_log()?.ok_or_else(|| {
            SyncError::integrity("remote metadata exists but the history log is missing")
        })?;
        let remote_changed = remote_log.hash() != baseline.hash();
        debug!(local_changes = changes.len(), remote_changed, "sync decision");

        match (changes.is_empty(), remote_changed) {
            (true, false) => Ok(Outcome::new(SyncAction::UpToDate)),
            (false, false) => {
                self.set_state(SyncState::Pushing);
                let pushed = self.push(&local, &changes, remote_log)?;
                Ok(Outcome {
                    pushed,
                    ..Outcome::new(SyncAction::Pushed)
                })
            }
            (true, true) => {
                self.set_state(SyncState::Pulling);
                let entries = self.remote_changes(&baseline, &remote_log);
                self.apply_remote(&entries)?;
                self.state_store.save_baseline(remote_log.text())?;
                Ok(Outcome {
                    pulled: entries.len(),
                    ..Outcome::new(SyncAction::Pulled)
                })
            }
            (false, true) => {
                self.set_state(SyncState::Resolving);
                self.resolve(&local, &changes, &baseline, remote_log)
            }
        }
    }

    /// Seeds an empty remote with the whole local library.
    fn initialize(&self, local: &LocalState) -> SyncResult<Outcome> {
        self.set_state(SyncState::Initializing);
        let timestamp = next_timestamp(None, self.clock.now());
        let entries = to_entries(&diff(local, &Snapshot::new()), timestamp, self.tag());

        self.write_objects(&entries, local)?;
        let mut log = HistoryLog::new();
        let pushed = log.extend(entries);
        self.publish(&log)?;
        info!(entries = pushed, "initialized remote");

        Ok(Outcome {
            pushed,
            ..Outcome::new(SyncAction::Initialized)
        })
    }

    /// Appends local changes to the remote log.
    ///
    /// Objects are written first, in canonical order, then the log, then the
    /// metadata. A failure at any point leaves the remote log no further than
    /// the objects it references.
    fn push(&self, local: &LocalState, changes: &ChangeSet, remote_log: HistoryLog) -> SyncResult<usize> {
        let timestamp = next_timestamp(remote_log.last_timestamp(), self.clock.now());
        let entries = to_entries(changes, timestamp, self.tag());
        self.write_objects(&entries, local)?;

        let mut log = remote_log;
        let pushed = log.extend(entries);
        self.publish(&log)?;
        Ok(pushed)
    }

    fn write_objects(&self, entries: &[HistoryEntry], local: &LocalState) -> SyncResult<()> {
        for entry in entries {
            if entry.operation == Operation::ForceClear || entry.is_directory() {
                continue;
            }
            let key = self.config.object_key(&entry.path);
            if entry.operation == Operation::Delete {
                self.remote.delete(&key)?;
                debug!(%key, "deleted object");
            } else {
                let file = local.files.get(&entry.path).ok_or_else(|| {
                    SyncError::integrity(format!("no local content for {}", entry.path))
                })?;
                self.remote.put(&key, &file.object.to_json()?)?;
                debug!(%key, "wrote object");
            }
        }
        Ok(())
    }

    /// Uploads the log, then the metadata, then adopts the log as baseline.
    fn publish(&self, log: &HistoryLog) -> SyncResult<()> {
        self.remote
            .put(&self.config.history_key, log.text().as_bytes())?;
        let metadata = CloudMetadata::from_log(log.text(), self.clock.now());
        self.remote
            .put(&self.config.metadata_key, &metadata.to_json()?)?;
        self.state_store.save_baseline(log.text())?;
        Ok(())
    }

    /// Remote entries this device has not applied, as the net change per
    /// path in canonical order.
    fn remote_changes(&self, baseline: &HistoryLog, remote_log: &HistoryLog) -> Vec<HistoryEntry> {
        let fresh = new_entries(remote_log.entries(), baseline.entries());
        let net = net_changes(&fresh);
        if net.force_clear {
            info!("remote history was reset, moving to the new remote state");
            let timestamp = remote_log
                .last_timestamp()
                .unwrap_or_else(|| self.clock.now());
            baseline
                .snapshot()
                .delta_to(&remote_log.snapshot(), timestamp, None)
        } else {
            net.entries
        }
    }

    /// Downloads the object of every snippet ADD or MODIFY.
    fn fetch_objects(&self, entries: &[HistoryEntry]) -> SyncResult<HashMap<String, PathSnippet>> {
        let mut objects = HashMap::new();
        for entry in entries {
            if entry.is_directory() || !matches!(entry.operation, Operation::Add | Operation::Modify) {
                continue;
            }
            let key = self.config.object_key(&entry.path);
            let bytes = self.remote.get(&key)?.ok_or_else(|| {
                SyncError::integrity(format!(
                    "history references {} but object {key} is missing",
                    entry.path
                ))
            })?;
            let mut object = PathSnippet::from_json(&bytes)?;
            if object.full_path != entry.path {
                warn!(path = %entry.path, stored = %object.full_path, "object path disagrees with its key");
                object.full_path = entry.path.clone();
            }
            let actual = sync_snippet_hash(&object.to_snippet(), &entry.path);
            if actual != entry.hash {
                warn!(
                    path = %entry.path,
                    logged = %entry.hash,
                    %actual,
                    "object content does not match its log entry"
                );
            }
            objects.insert(entry.path.clone(), object);
        }
        Ok(objects)
    }

    /// Applies remote entries locally. Every object is downloaded before the
    /// first local mutation.
    fn apply_remote(&self, entries: &[HistoryEntry]) -> SyncResult<ApplyStats> {
        let objects = self.fetch_objects(entries)?;
        let mut applier = LocalApplier::new(&self.local)?;
        for entry in entries {
            applier.apply_entry(entry, &objects)?;
        }
        let stats = applier.stats();
        self.refresh_if_changed(stats)?;
        Ok(stats)
    }

    fn refresh_if_changed(&self, stats: ApplyStats) -> SyncResult<()> {
        if !stats.is_empty() {
            self.local.clear_cache()?;
            self.notify(|l| l.on_refresh_view());
        }
        Ok(())
    }

    fn record_conflicts(&self, conflicts: &[Conflict]) {
        if conflicts.is_empty() {
            return;
        }
        self.cycle_conflicts.lock().extend(conflicts.iter().cloned());
        self.notify(|l| l.on_conflict_detected(conflicts));
    }

    /// Reconciles changes made on both sides, then pushes the result.
    ///
    /// Remote changes to paths this device did not touch are applied. Paths
    /// both sides changed to the same state converge silently. The rest are
    /// conflicts, settled by merge, then the decider, then the policy; if
    /// the policy blocks, the cycle fails before anything is written.
    fn resolve(
        &self,
        local: &LocalState,
        changes: &ChangeSet,
        baseline: &HistoryLog,
        remote_log: HistoryLog,
    ) -> SyncResult<Outcome> {
        let touched = changes.paths();
        let mut to_apply = Vec::new();
        let mut candidates = Vec::new();

        for entry in self.remote_changes(baseline, &remote_log) {
            if !touched.contains(entry.path.as_str()) {
                to_apply.push(entry);
                continue;
            }
            if entry.is_directory() {
                debug!(path = %entry.path, "directory changed on both sides, keeping local");
                continue;
            }
            let local_hash = local.files.get(&entry.path).map(|f| f.hash.clone());
            let remote_hash = (entry.operation != Operation::Delete).then(|| entry.hash.clone());
            if local_hash == remote_hash {
                debug!(path = %entry.path, "both sides agree");
                continue;
            }
            let conflict = Conflict::new(entry.path.clone(), local_hash, remote_hash);
            candidates.push((entry, conflict));
        }

        let mut wanted: Vec<HistoryEntry> = to_apply.clone();
        wanted.extend(candidates.iter().map(|(entry, _)| entry.clone()));
        let objects = self.fetch_objects(&wanted)?;

        let mut conflicts = Vec::new();
        let mut merged = Vec::new();
        let mut blocked = Vec::new();
        for (entry, mut conflict) in candidates {
            let local_object = local.files.get(&entry.path).map(|f| &f.object);
            let remote_object = objects.get(&entry.path);

            if let (Some(mine), Some(theirs)) = (local_object, remote_object) {
                if let MergeOutcome::Merged(result) = merge_snippets(mine, theirs) {
                    debug!(path = %entry.path, "merged divergent versions");
                    conflict.resolve(ConflictResolution::Merged);
                    merged.push(result);
                    conflicts.push(conflict);
                    continue;
                }
            }

            let decision = self
                .decider
                .as_ref()
                .and_then(|d| d.decide(&conflict, local_object, remote_object))
                .or_else(|| self.config.conflict_policy.resolution());
            match decision {
                Some(ConflictResolution::AcceptRemote) => {
                    conflict.resolve(ConflictResolution::AcceptRemote);
                    to_apply.push(entry);
                }
                Some(_) => conflict.resolve(ConflictResolution::KeepLocal),
                None => blocked.push(conflict.path.clone()),
            }
            conflicts.push(conflict);
        }

        self.record_conflicts(&conflicts);
        if !blocked.is_empty() {
            return Err(SyncError::UnresolvedConflict { paths: blocked });
        }

        canonical_sort(&mut to_apply);
        let mut applier = LocalApplier::new(&self.local)?;
        for entry in &to_apply {
            applier.apply_entry(entry, &objects)?;
        }
        for object in &merged {
            applier.upsert_snippet(object)?;
        }
        self.refresh_if_changed(applier.stats())?;

        let after = LocalState::from_library(&self.local.library()?);
        let remaining = diff(&after, &remote_log.snapshot());
        let pushed = if remaining.is_empty() {
            self.state_store.save_baseline(remote_log.text())?;
            0
        } else {
            self.push(&after, &remaining, remote_log)?
        };

        Ok(Outcome {
            action: SyncAction::Resolved,
            pushed,
            pulled: to_apply.len(),
        })
    }

    fn reset_remote(&self, library: &Library) -> SyncResult<Outcome> {
        self.config.validate()?;
        self.set_state(SyncState::Resetting);
        let local = LocalState::from_library(library);

        let mut stale: BTreeSet<String> = BTreeSet::new();
        let mut last = None;
        if let Some(log) = self.fetch_remote_log()? {
            last = log.last_timestamp();
            stale.extend(log.snapshot().files.into_keys());
        }
        if let Some(metadata) = self.fetch_metadata()? {
            stale.extend(metadata.files.into_keys());
        }
        for path in stale.iter().filter(|p| !local.files.contains_key(*p)) {
            self.remote.delete(&self.config.object_key(path))?;
        }

        let timestamp = next_timestamp(last, self.clock.now());
        let entries = to_entries(&diff(&local, &Snapshot::new()), timestamp, self.tag());
        self.write_objects(&entries, &local)?;

        let mut log = HistoryLog::new();
        log.append(HistoryEntry::force_clear(timestamp, self.tag().map(str::to_string)));
        let pushed = log.extend(entries);
        self.publish(&log)?;
        warn!(removed = stale.len(), entries = pushed, "remote history reset");

        Ok(Outcome {
            pushed,
            ..Outcome::new(SyncAction::ForceReset)
        })
    }

    fn import_remote(&self) -> SyncResult<Outcome> {
        self.set_state(SyncState::Importing);
        let remote_log = self
            .fetch_remote_log()?
            .ok_or_else(|| SyncError::Configuration("remote has no history to import".into()))?;
        let entries = remote_log.snapshot().to_entries();
        let objects = self.fetch_objects(&entries)?;

        for snippet in self.local.get_all_snippets()? {
            self.local.delete_snippet(&snippet.id)?;
        }
        for directory in self.local.get_all_directories()? {
            self.local.delete_directory(&directory.id)?;
        }

        let mut applier = LocalApplier::new(&self.local)?;
        for entry in &entries {
            applier.apply_entry(entry, &objects)?;
        }
        self.local.clear_cache()?;
        self.notify(|l| l.on_refresh_view());
        self.state_store.save_baseline(remote_log.text())?;
        warn!(items = entries.len(), "local library replaced by remote");

        Ok(Outcome {
            pulled: entries.len(),
            ..Outcome::new(SyncAction::Imported)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::local::MemoryLocalStore;
    use chrono::{DateTime, Utc};
    use snipsync_protocol::{parse_timestamp, validate, ConflictPolicy, Directory, Snippet};
    use snipsync_store::{InMemoryObjectStore, StoreWrite};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            parse_timestamp("2024-05-01T10:00:00.000Z").unwrap(),
        ))
    }

    fn snippet(id: &str, name: &str, code: &str, parent: Option<&str>) -> Snippet {
        Snippet {
            id: id.into(),
            name: name.into(),
            code: code.into(),
            language: "rust".into(),
            parent_id: parent.map(Into::into),
            order: 0,
            create_time: 0,
        }
    }

    fn dir(id: &str, name: &str) -> Directory {
        Directory {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            order: 0,
        }
    }

    type Engine = SyncEngine<Arc<InMemoryObjectStore>, Arc<MemoryLocalStore>>;

    fn engine(remote: &Arc<InMemoryObjectStore>, library: Library, tag: &str) -> Engine {
        SyncEngine::new(
            SyncConfig::new(tag),
            Arc::clone(remote),
            Arc::new(MemoryLocalStore::with_library(library)),
        )
        .with_clock(clock())
    }

    fn remote_text(remote: &InMemoryObjectStore) -> String {
        String::from_utf8(remote.get("sync/history.log").unwrap().unwrap()).unwrap()
    }

    #[test]
    fn sync_state_checks() {
        assert!(!SyncState::Idle.is_active());
        assert!(SyncState::Pulling.is_active());
        assert!(SyncState::Resolving.is_active());
    }

    #[test]
    fn first_sync_initializes_remote() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let library = Library::new(
            vec![snippet("s1", "hello", "fn main() {}", Some("d1"))],
            vec![dir("d1", "rust")],
        );
        let engine = engine(&remote, library, "laptop");

        let result = engine.sync();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.action, Some(SyncAction::Initialized));
        assert_eq!(result.pushed, 2);

        assert_eq!(
            remote.writes(),
            vec![
                StoreWrite::Put("snippets/rust/hello.snippet".into()),
                StoreWrite::Put("sync/history.log".into()),
                StoreWrite::Put("sync/metadata.json".into()),
            ]
        );
        let text = remote_text(&remote);
        assert!(validate(&text).is_empty());
        assert_eq!(engine.baseline().unwrap().text(), text);
        assert!(!engine.status().unwrap().is_syncing);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    /// Starts a nested cycle from inside the completion notification.
    struct NestedSync {
        engine: Mutex<Option<std::sync::Weak<Engine>>>,
        remote: Arc<InMemoryObjectStore>,
        nested: Mutex<Option<(SyncCycleResult, usize)>>,
    }

    impl SyncListener for NestedSync {
        fn on_sync_complete(&self, _result: &SyncCycleResult) {
            let Some(engine) = self.engine.lock().as_ref().and_then(std::sync::Weak::upgrade) else {
                return;
            };
            let before = self.remote.writes().len();
            let result = engine.sync();
            let written = self.remote.writes().len() - before;
            *self.nested.lock() = Some((result, written));
        }
    }

    #[test]
    fn overlapping_cycle_is_refused() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let listener = Arc::new(NestedSync {
            engine: Mutex::new(None),
            remote: Arc::clone(&remote),
            nested: Mutex::new(None),
        });
        let library = Library::new(vec![snippet("s", "a", "x", None)], vec![]);
        let engine = Arc::new(engine(&remote, library, "a").with_listener(listener.clone()));
        *listener.engine.lock() = Some(Arc::downgrade(&engine));

        let outer = engine.sync();
        assert!(outer.success, "{}", outer.message);

        let (nested, written) = listener.nested.lock().take().unwrap();
        assert!(!nested.success);
        assert_eq!(nested.error_category, Some(ErrorCategory::Busy));
        assert_eq!(written, 0);
        assert_eq!(engine.stats().cycles_completed, 1);

        // the guard is released once the outer cycle returns
        *listener.engine.lock() = None;
        assert_eq!(engine.sync().action, Some(SyncAction::UpToDate));
    }

    #[test]
    fn unchanged_sync_reads_only_metadata() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(engine.sync().success);
        remote.clear_writes();

        let result = engine.sync();
        assert_eq!(result.action, Some(SyncAction::UpToDate));
        assert!(remote.writes().is_empty());
        assert!(engine.status().unwrap().last_sync_timestamp.is_some());
    }

    #[test]
    fn local_edit_pushes_modify() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(engine.sync().success);

        engine.local().update_snippet(snippet("s", "a", "y", None)).unwrap();
        let result = engine.sync();
        assert_eq!(result.action, Some(SyncAction::Pushed));
        assert_eq!(result.pushed, 1);
        assert!(remote_text(&remote).contains("~ | a.snippet"));
    }

    #[test]
    fn edge_whitespace_and_line_breaks_in_names_settle() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let library = Library::new(
            vec![
                snippet("s", " hello", "x", None),
                snippet("t", "two\nlines", "y", Some("d")),
            ],
            vec![dir("d", "tail ")],
        );
        let a = engine(&remote, library, "a");
        assert!(a.sync().success);
        assert_eq!(remote_text(&remote).lines().count(), 3);
        remote.clear_writes();

        let again = a.sync();
        assert_eq!(again.action, Some(SyncAction::UpToDate));
        assert!(remote.writes().is_empty());

        let b = engine(&remote, Library::default(), "b");
        assert!(b.sync().success);
        let mut names: Vec<String> = b
            .local()
            .get_all_snippets()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();
        assert_eq!(names, vec![" hello".to_string(), "two\nlines".to_string()]);
        assert_eq!(b.local().get_all_directories().unwrap()[0].name, "tail ");
    }

    #[test]
    fn names_unfit_for_keys_are_left_out() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let library = Library::new(
            vec![snippet("s", "regex \\d", "x", None), snippet("t", "ok", "y", None)],
            vec![],
        );
        let engine = engine(&remote, library, "a");

        let result = engine.sync();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.pushed, 1);
        assert_eq!(
            remote.writes(),
            vec![
                StoreWrite::Put("snippets/ok.snippet".into()),
                StoreWrite::Put("sync/history.log".into()),
                StoreWrite::Put("sync/metadata.json".into()),
            ]
        );
        assert_eq!(engine.sync().action, Some(SyncAction::UpToDate));
    }

    #[test]
    fn pull_keeps_object_content_that_outran_its_log_entry() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let a = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(a.sync().success);

        let key = "snippets/a.snippet";
        let mut object = PathSnippet::from_json(&remote.get(key).unwrap().unwrap()).unwrap();
        object.code = "rewritten".into();
        remote.put(key, &object.to_json().unwrap()).unwrap();

        let b = engine(&remote, Library::default(), "b");
        let result = b.sync();
        assert!(result.success, "{}", result.message);
        assert_eq!(b.local().get_all_snippets().unwrap()[0].code, "rewritten");
    }

    #[test]
    fn partial_failure_leaves_log_untouched() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(engine.sync().success);
        let before = remote_text(&remote);

        engine.local().create_snippet(snippet("t", "b", "1", None)).unwrap();
        engine.local().create_snippet(snippet("u", "c", "2", None)).unwrap();
        remote.fail_puts_after(1);

        let result = engine.sync();
        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::TransientNetwork));
        assert_eq!(remote_text(&remote), before);
        assert!(engine.status().unwrap().last_error.is_some());
        assert!(!engine.status().unwrap().is_syncing);

        remote.clear_failures();
        let retry = engine.sync();
        assert!(retry.success, "{}", retry.message);
        assert_eq!(retry.pushed, 2);
        assert!(validate(&remote_text(&remote)).is_empty());
    }

    #[test]
    fn editing_guard_skips_cycle() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let flag = Arc::new(crate::listener::EditingFlag::new());
        flag.set(true);
        let engine = engine(&remote, Library::default(), "a").with_editing_guard(flag.clone());

        let result = engine.sync();
        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Busy));
        assert!(remote.is_empty());

        flag.set(false);
        assert!(engine.sync().success);
    }

    #[test]
    fn blocking_policy_writes_nothing() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let a = engine(&remote, Library::new(vec![snippet("s", "a", "one", None)], vec![]), "a");
        assert!(a.sync().success);
        let b = SyncEngine::new(
            SyncConfig::new("b").with_conflict_policy(ConflictPolicy::Block),
            Arc::clone(&remote),
            Arc::new(MemoryLocalStore::new()),
        )
        .with_clock(clock());
        assert!(b.sync().success);

        a.local().update_snippet(snippet("s", "a", "from a", None)).unwrap();
        assert!(a.sync().success);
        let s = b.local().get_all_snippets().unwrap().remove(0);
        b.local()
            .update_snippet(Snippet { code: "from b".into(), ..s })
            .unwrap();
        remote.clear_writes();

        let result = b.sync();
        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Conflict));
        assert_eq!(result.conflicts.len(), 1);
        assert!(!result.conflicts[0].is_resolved());
        assert!(remote.writes().is_empty());
        assert_eq!(b.local().get_all_snippets().unwrap()[0].code, "from b");
    }

    #[test]
    fn missing_metadata_is_rebuilt() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(engine.sync().success);
        remote.delete("sync/metadata.json").unwrap();

        let result = engine.sync();
        assert!(result.success);
        assert_eq!(result.action, Some(SyncAction::UpToDate));
        assert!(remote.exists("sync/metadata.json").unwrap());
    }

    #[test]
    fn invalid_config_is_reported() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = SyncEngine::new(
            SyncConfig::new(""),
            Arc::clone(&remote),
            Arc::new(MemoryLocalStore::new()),
        );
        let result = engine.sync();
        assert_eq!(result.error_category, Some(ErrorCategory::Configuration));
        assert!(remote.is_empty());
    }

    #[test]
    fn import_requires_remote_history() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::default(), "a");
        let result = engine.abandon_local_and_import();
        assert!(!result.success);
        assert_eq!(result.error_category, Some(ErrorCategory::Configuration));
    }

    #[test]
    fn timestamps_follow_the_remote_log() {
        let remote = Arc::new(InMemoryObjectStore::new());
        let engine = engine(&remote, Library::new(vec![snippet("s", "a", "x", None)], vec![]), "a");
        assert!(engine.sync().success);

        // Same clock reading: the next push must still be later.
        engine.local().update_snippet(snippet("s", "a", "y", None)).unwrap();
        assert!(engine.sync().success);
        let log = HistoryLog::parse(&remote_text(&remote));
        let times: Vec<DateTime<Utc>> = log.entries().iter().map(|e| e.timestamp).collect();
        assert!(times[1] > times[0]);
    }
}
