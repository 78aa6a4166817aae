//! Reset command implementation.

use super::{open_engine, report, CommandResult};
use std::path::Path;

/// Replaces the remote history with this device's library.
pub fn run(config_dir: &Path, yes: bool) -> CommandResult {
    if !yes {
        return Err(
            "reset deletes every remote object and rewrites history for all devices; \
             pass --yes to confirm"
                .into(),
        );
    }
    let (_, engine) = open_engine(config_dir)?;
    report(&engine.force_reset())
}
