//! Status command implementation.

use super::{open_engine, CommandResult};
use serde::Serialize;
use snipsync_protocol::format_timestamp;
use std::path::Path;

/// Sync status as reported to the user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Device tag.
    pub device: String,
    /// Remote directory.
    pub remote: String,
    /// A cycle was left unfinished.
    pub is_syncing: bool,
    /// When the last successful cycle finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    /// Message of the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Entries in the baseline log.
    pub baseline_entries: usize,
    /// Local changes not yet pushed.
    pub local_changes: usize,
    /// Whether the remote moved since the baseline; absent if the remote
    /// was never initialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_changed: Option<bool>,
}

/// Runs the status command.
pub fn run(config_dir: &Path, format: &str) -> CommandResult {
    let (profile, engine) = open_engine(config_dir)?;
    let status = engine.status()?;
    let report = StatusReport {
        device: profile.device_tag,
        remote: profile.remote.display().to_string(),
        is_syncing: status.is_syncing,
        last_sync: status.last_sync_timestamp.as_ref().map(format_timestamp),
        last_error: status.last_error,
        baseline_entries: engine.baseline()?.len(),
        local_changes: engine.local_changes()?.len(),
        remote_changed: engine.remote_changed()?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &StatusReport) {
    println!("Device:          {}", report.device);
    println!("Remote:          {}", report.remote);
    println!(
        "Last sync:       {}",
        report.last_sync.as_deref().unwrap_or("never")
    );
    if let Some(error) = &report.last_error {
        println!("Last error:      {error}");
    }
    if report.is_syncing {
        println!("Warning:         previous sync did not finish");
    }
    println!("Baseline:        {} entries", report.baseline_entries);
    println!("Local changes:   {}", report.local_changes);
    let remote = match report.remote_changed {
        Some(true) => "changed",
        Some(false) => "unchanged",
        None => "not initialized",
    };
    println!("Remote:          {remote}");
}
