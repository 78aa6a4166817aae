//! The per-device profile and the JSON-file library store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snipsync_engine::{LocalStore, SyncError, SyncResult};
use snipsync_protocol::{Directory, Library, Snippet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the profile file inside the config directory.
pub const PROFILE_FILE: &str = "snipsync.json";

/// Default library file name inside the config directory.
pub const LIBRARY_FILE: &str = "library.json";

/// Name of the state directory inside the config directory.
pub const STATE_DIR: &str = "state";

/// Errors reading or writing the profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile in the config directory.
    #[error("no profile at {0}, run `snipsync init` first")]
    Missing(PathBuf),

    /// The profile exists but cannot be decoded.
    #[error("invalid profile {path}: {source}")]
    Invalid {
        /// Profile path.
        path: PathBuf,
        /// Decoding error.
        source: serde_json::Error,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What `snipsync init` records about this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Directory acting as the remote bucket.
    pub remote: PathBuf,
    /// Tag written into every log line this device appends.
    pub device_tag: String,
    /// JSON file holding the local library.
    pub library: PathBuf,
}

impl Profile {
    /// Creates a profile, generating a device tag if none is given.
    pub fn new(remote: PathBuf, device_tag: Option<String>, library: PathBuf) -> Self {
        let device_tag = device_tag.unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().simple().to_string();
            id[..8].to_string()
        });
        Self {
            remote,
            device_tag,
            library,
        }
    }

    /// Loads the profile from a config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is missing or unreadable.
    pub fn load(config_dir: &Path) -> Result<Self, ProfileError> {
        let path = config_dir.join(PROFILE_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ProfileError::Missing(path))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&text).map_err(|source| ProfileError::Invalid { path, source })
    }

    /// Writes the profile into a config directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, config_dir: &Path) -> Result<(), ProfileError> {
        fs::create_dir_all(config_dir)?;
        let json = serde_json::to_vec_pretty(self).map_err(|source| ProfileError::Invalid {
            path: config_dir.join(PROFILE_FILE),
            source,
        })?;
        write_atomic(&config_dir.join(PROFILE_FILE), &json)?;
        Ok(())
    }
}

fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
    let temp = target.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&temp, target)
}

/// A local store kept as one JSON document.
///
/// The whole library is loaded on open and rewritten after every mutation.
#[derive(Debug)]
pub struct JsonLibraryStore {
    path: PathBuf,
    library: RwLock<Library>,
}

impl JsonLibraryStore {
    /// Opens a library file; a missing file is an empty library.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be decoded.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let library = Self::read(&path)?;
        Ok(Self {
            path,
            library: RwLock::new(library),
        })
    }

    /// Writes an empty library file unless one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn create_if_missing(path: &Path) -> SyncResult<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::write(path, &Library::default())
    }

    fn read(path: &Path) -> SyncResult<Library> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                SyncError::local(format!("unreadable library {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Library::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(path: &Path, library: &Library) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(library)
            .map_err(|err| SyncError::local(err.to_string()))?;
        Ok(write_atomic(path, &json)?)
    }

    fn mutate(&self, f: impl FnOnce(&mut Library) -> SyncResult<()>) -> SyncResult<()> {
        let mut library = self.library.write();
        f(&mut library)?;
        Self::write(&self.path, &library)
    }
}

impl LocalStore for JsonLibraryStore {
    fn get_all_snippets(&self) -> SyncResult<Vec<Snippet>> {
        Ok(self.library.read().snippets.clone())
    }

    fn get_all_directories(&self) -> SyncResult<Vec<Directory>> {
        Ok(self.library.read().directories.clone())
    }

    fn create_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        self.mutate(|library| {
            if library.snippets.iter().any(|s| s.id == snippet.id) {
                return Err(SyncError::local(format!("snippet {} already exists", snippet.id)));
            }
            library.snippets.push(snippet);
            Ok(())
        })
    }

    fn update_snippet(&self, snippet: Snippet) -> SyncResult<()> {
        self.mutate(|library| {
            let existing = library
                .snippets
                .iter_mut()
                .find(|s| s.id == snippet.id)
                .ok_or_else(|| SyncError::local(format!("snippet {} does not exist", snippet.id)))?;
            *existing = snippet;
            Ok(())
        })
    }

    fn delete_snippet(&self, id: &str) -> SyncResult<()> {
        self.mutate(|library| {
            library.snippets.retain(|s| s.id != id);
            Ok(())
        })
    }

    fn create_directory(&self, directory: Directory) -> SyncResult<()> {
        self.mutate(|library| {
            if library.directories.iter().any(|d| d.id == directory.id) {
                return Err(SyncError::local(format!(
                    "directory {} already exists",
                    directory.id
                )));
            }
            library.directories.push(directory);
            Ok(())
        })
    }

    fn update_directory(&self, directory: Directory) -> SyncResult<()> {
        self.mutate(|library| {
            let existing = library
                .directories
                .iter_mut()
                .find(|d| d.id == directory.id)
                .ok_or_else(|| {
                    SyncError::local(format!("directory {} does not exist", directory.id))
                })?;
            *existing = directory;
            Ok(())
        })
    }

    fn delete_directory(&self, id: &str) -> SyncResult<()> {
        self.mutate(|library| {
            library.directories.retain(|d| d.id != id);
            Ok(())
        })
    }

    fn clear_cache(&self) -> SyncResult<()> {
        let fresh = Self::read(&self.path)?;
        *self.library.write() = fresh;
        debug!(path = %self.path.display(), "reloaded library");
        Ok(())
    }
}
