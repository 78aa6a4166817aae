//! Sync command implementation.

use super::{open_engine, report, CommandResult};
use std::path::Path;

/// Runs one sync cycle.
pub fn run(config_dir: &Path) -> CommandResult {
    let (_, engine) = open_engine(config_dir)?;
    report(&engine.sync())
}
