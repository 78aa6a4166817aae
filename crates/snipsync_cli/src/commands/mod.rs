//! CLI command implementations.

pub mod dump_log;
pub mod import;
pub mod init;
pub mod reset;
pub mod snapshot;
pub mod status;
pub mod sync;
pub mod verify;

use crate::profile::{JsonLibraryStore, Profile, STATE_DIR};
use snipsync_engine::{FileStateStore, SyncConfig, SyncCycleResult, SyncEngine};
use snipsync_protocol::HistoryLog;
use snipsync_store::DirectoryObjectStore;
use std::error::Error;
use std::path::Path;

/// Result type shared by commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// The engine as the CLI wires it.
pub type CliEngine = SyncEngine<DirectoryObjectStore, JsonLibraryStore>;

/// Loads the profile and builds an engine from it.
pub fn open_engine(config_dir: &Path) -> CommandResult<(Profile, CliEngine)> {
    let profile = Profile::load(config_dir)?;
    let remote = DirectoryObjectStore::open(&profile.remote)?;
    let local = JsonLibraryStore::open(&profile.library)?;
    let state = FileStateStore::open(config_dir.join(STATE_DIR))?;
    let config = SyncConfig::new(profile.device_tag.clone());
    config.validate()?;
    let engine = SyncEngine::new(config, remote, local).with_state_store(state);
    Ok((profile, engine))
}

/// The baseline log, or the remote log if `remote` is set.
pub fn load_log(engine: &CliEngine, remote: bool) -> CommandResult<HistoryLog> {
    if remote {
        Ok(engine
            .fetch_remote_log()?
            .ok_or("remote has no history log yet")?)
    } else {
        Ok(engine.baseline()?)
    }
}

/// Prints a cycle outcome and turns a failure into an error.
pub fn report(result: &SyncCycleResult) -> CommandResult {
    println!("{}", result.message);
    for conflict in &result.conflicts {
        let resolution = conflict
            .resolution
            .map(|r| format!("{r:?}"))
            .unwrap_or_else(|| "unresolved".to_string());
        println!("  conflict {} ({:?}): {}", conflict.path, conflict.kind, resolution);
    }
    if result.success {
        Ok(())
    } else {
        Err(result.message.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipsync_engine::LocalStore;
    use snipsync_protocol::Snippet;
    use tempfile::tempdir;

    #[test]
    fn init_then_sync_publishes_library() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("config");
        let bucket = dir.path().join("bucket");
        init::run(&config, bucket.clone(), Some("dev1".into()), None, false).unwrap();
        assert!(init::run(&config, bucket, None, None, false).is_err());

        let (profile, engine) = open_engine(&config).unwrap();
        assert_eq!(profile.device_tag, "dev1");
        engine
            .local()
            .create_snippet(Snippet {
                id: "s1".into(),
                name: "hello".into(),
                code: "echo hi\n".into(),
                language: "bash".into(),
                parent_id: None,
                order: 0,
                create_time: 1,
            })
            .unwrap();
        report(&engine.sync()).unwrap();

        let remote = load_log(&engine, true).unwrap();
        assert_eq!(remote.len(), 1);
        assert_eq!(load_log(&engine, false).unwrap().text(), remote.text());
        verify::run(&config, true).unwrap();
    }

    #[test]
    fn destructive_commands_need_confirmation() {
        let dir = tempdir().unwrap();
        assert!(reset::run(dir.path(), false).is_err());
        assert!(import::run(dir.path(), false).is_err());
    }

    #[test]
    fn remote_log_is_required_before_first_sync() {
        let dir = tempdir().unwrap();
        init::run(dir.path(), dir.path().join("bucket"), None, None, false).unwrap();
        let (_, engine) = open_engine(dir.path()).unwrap();
        assert!(load_log(&engine, true).is_err());
        assert!(load_log(&engine, false).unwrap().is_empty());
    }
}
