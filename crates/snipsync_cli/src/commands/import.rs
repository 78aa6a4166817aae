//! Import command implementation.

use super::{open_engine, report, CommandResult};
use std::path::Path;

/// Replaces this device's library with the remote state.
pub fn run(config_dir: &Path, yes: bool) -> CommandResult {
    if !yes {
        return Err("import discards every local change; pass --yes to confirm".into());
    }
    let (_, engine) = open_engine(config_dir)?;
    report(&engine.abandon_local_and_import())
}
