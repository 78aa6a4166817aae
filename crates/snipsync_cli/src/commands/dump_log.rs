//! Dump-log command implementation.

use super::{load_log, open_engine, CommandResult};
use serde::Serialize;
use snipsync_protocol::{format_timestamp, HistoryEntry};
use std::path::Path;

/// A log entry as printed.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Operation name.
    pub op: String,
    /// Item path.
    pub path: String,
    /// Content hash.
    pub hash: String,
    /// Entry timestamp.
    pub timestamp: String,
    /// Writing device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl From<&HistoryEntry> for EntryInfo {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            op: entry.operation.to_string(),
            path: entry.path.clone(),
            hash: entry.hash.clone(),
            timestamp: format_timestamp(&entry.timestamp),
            device: entry.device_tag.clone(),
        }
    }
}

/// Runs the dump-log command.
pub fn run(config_dir: &Path, remote: bool, format: &str, limit: Option<usize>) -> CommandResult {
    let (_, engine) = open_engine(config_dir)?;
    let log = load_log(&engine, remote)?;
    let entries: Vec<EntryInfo> = log
        .entries()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(EntryInfo::from)
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            for entry in &entries {
                println!(
                    "{:<12} {:<24} {} {} {}",
                    entry.op,
                    entry.timestamp,
                    short(&entry.hash),
                    entry.device.as_deref().unwrap_or("-"),
                    entry.path
                );
            }
            println!();
            println!("Total: {} of {} entries", entries.len(), log.len());
        }
    }
    Ok(())
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
