//! Verify command implementation.

use super::{load_log, open_engine, CommandResult};
use snipsync_protocol::{validate, CloudMetadata};
use std::path::Path;

/// Validates the baseline log, or the remote log and its metadata.
pub fn run(config_dir: &Path, remote: bool) -> CommandResult {
    let (_, engine) = open_engine(config_dir)?;
    let log = load_log(&engine, remote)?;
    let which = if remote { "remote" } else { "baseline" };

    println!("Verifying {which} log ({} entries)", log.len());
    let mut problems: Vec<String> = validate(log.text()).iter().map(|i| i.to_string()).collect();

    if remote {
        match engine.fetch_metadata()? {
            Some(metadata) if metadata.describes(log.text()) => {
                let expected = CloudMetadata::from_log(log.text(), metadata.last_sync_timestamp);
                if expected.files != metadata.files {
                    problems.push("metadata file list disagrees with the log".to_string());
                }
            }
            Some(_) => problems.push("metadata hash does not match the log".to_string()),
            None => problems.push("metadata is missing".to_string()),
        }
    }

    if problems.is_empty() {
        println!("OK");
        return Ok(());
    }
    for problem in &problems {
        println!("  {problem}");
    }
    Err(format!("{} problem(s) found", problems.len()).into())
}
