//! Snapshot command implementation.

use super::{load_log, open_engine, CommandResult};
use std::path::Path;

/// Prints the state obtained by replaying a log.
pub fn run(config_dir: &Path, remote: bool, format: &str) -> CommandResult {
    let (_, engine) = open_engine(config_dir)?;
    let snapshot = load_log(&engine, remote)?.snapshot();

    match format {
        "json" => {
            let files: serde_json::Map<String, serde_json::Value> = snapshot
                .files
                .iter()
                .map(|(path, state)| (path.clone(), serde_json::Value::from(state.hash.clone())))
                .collect();
            let json = serde_json::json!({
                "directories": snapshot.directories,
                "files": files,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            for path in &snapshot.directories {
                println!("{path}");
            }
            for (path, state) in &snapshot.files {
                println!("{path}  {}", state.hash);
            }
            println!();
            println!(
                "{} directories, {} files",
                snapshot.directories.len(),
                snapshot.files.len()
            );
        }
    }
    Ok(())
}
