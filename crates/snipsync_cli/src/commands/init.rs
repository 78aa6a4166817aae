//! Init command implementation.

use super::CommandResult;
use crate::profile::{JsonLibraryStore, Profile, LIBRARY_FILE};
use std::path::{Path, PathBuf};

/// Runs the init command.
pub fn run(
    config_dir: &Path,
    remote: PathBuf,
    device: Option<String>,
    library: Option<PathBuf>,
    force: bool,
) -> CommandResult {
    if !force {
        if let Ok(existing) = Profile::load(config_dir) {
            return Err(format!(
                "profile already exists for device {} (use --force to replace it)",
                existing.device_tag
            )
            .into());
        }
    }

    let library = library.unwrap_or_else(|| config_dir.join(LIBRARY_FILE));
    let profile = Profile::new(remote, device, library);
    profile.save(config_dir)?;
    JsonLibraryStore::create_if_missing(&profile.library)?;

    println!("Initialized snipsync in {}", config_dir.display());
    println!("  Device:  {}", profile.device_tag);
    println!("  Remote:  {}", profile.remote.display());
    println!("  Library: {}", profile.library.display());
    Ok(())
}
