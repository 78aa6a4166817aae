//! Path identity.
//!
//! Items are addressed for sync purposes by a canonical slash path built
//! from the names of their ancestors. Directory paths end in `/`, snippet
//! paths end in [`SNIPPET_SUFFIX`]. Root items have no leading slash:
//!
//! ```text
//! rust/                  directory "rust" at the root
//! rust/cli/              directory "cli" inside "rust"
//! rust/cli/args.snippet  snippet "args" inside "cli"
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::item::{Directory, Snippet};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::warn;

/// Suffix appended to snippet names in paths.
pub const SNIPPET_SUFFIX: &str = ".snippet";

/// Number of hex characters kept from the path digest.
const PATH_ID_LEN: usize = 32;

/// Derives a stable identifier from a path.
///
/// The mapping is one-way: two devices that learn about the same path
/// independently arrive at the same ID without coordinating, but the path
/// cannot be recovered from the ID. Keep a [`PathIndex`] for lookups.
pub fn path_to_id(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(PATH_ID_LEN);
    hex
}

/// Returns true if the path names a directory.
pub fn is_directory_path(path: &str) -> bool {
    path.ends_with('/')
}

/// Returns the path of the containing directory, or `None` at the root.
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.rfind('/').map(|idx| &path[..=idx])
}

/// Number of segments in a path; root items have depth 1.
pub fn path_depth(path: &str) -> usize {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        0
    } else {
        trimmed.split('/').count()
    }
}

/// Last segment of a path, without the directory slash.
pub fn leaf_name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Snippet name encoded in a snippet path.
///
/// Returns `None` for directory paths and paths without the snippet suffix.
pub fn snippet_name_from_path(path: &str) -> Option<&str> {
    if is_directory_path(path) {
        return None;
    }
    leaf_name(path).strip_suffix(SNIPPET_SUFFIX)
}

fn validate_name(name: &str) -> ProtocolResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains('/') {
        "name contains a slash"
    } else if name == "." || name == ".." {
        "name is a relative segment"
    } else if name.contains(['\\', '\0']) {
        "name contains a backslash or NUL"
    } else {
        return Ok(());
    };
    Err(ProtocolError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Collects ancestor names root-first by walking parent links.
fn ancestor_names<'a>(
    item_id: &str,
    mut parent_id: Option<&'a str>,
    dirs: &HashMap<&str, &'a Directory>,
) -> ProtocolResult<Vec<&'a str>> {
    let mut names = Vec::new();
    while let Some(id) = parent_id {
        let dir = dirs.get(id).ok_or_else(|| ProtocolError::MissingParent {
            item_id: item_id.to_string(),
            parent_id: id.to_string(),
        })?;
        if names.len() > dirs.len() {
            return Err(ProtocolError::ParentCycle {
                item_id: item_id.to_string(),
            });
        }
        validate_name(&dir.name)?;
        names.push(dir.name.as_str());
        parent_id = dir.parent_id.as_deref();
    }
    names.reverse();
    Ok(names)
}

fn join(names: &[&str]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str(name);
        out.push('/');
    }
    out
}

/// Full path of a directory, ending in `/`.
///
/// # Errors
///
/// Fails on invalid names, missing parents or parent cycles.
pub fn directory_path(dir: &Directory, dirs: &HashMap<&str, &Directory>) -> ProtocolResult<String> {
    validate_name(&dir.name)?;
    let mut path = join(&ancestor_names(&dir.id, dir.parent_id.as_deref(), dirs)?);
    path.push_str(&dir.name);
    path.push('/');
    Ok(path)
}

/// Full path of a snippet, ending in [`SNIPPET_SUFFIX`].
///
/// # Errors
///
/// Fails on invalid names, missing parents or parent cycles.
pub fn snippet_path(snippet: &Snippet, dirs: &HashMap<&str, &Directory>) -> ProtocolResult<String> {
    validate_name(&snippet.name)?;
    let mut path = join(&ancestor_names(&snippet.id, snippet.parent_id.as_deref(), dirs)?);
    path.push_str(&snippet.name);
    path.push_str(SNIPPET_SUFFIX);
    Ok(path)
}

/// Known directory paths and their local IDs.
///
/// Path IDs cannot be inverted, so the engine keeps this index to map a
/// directory path seen in the log back to the directory the local store
/// already has, and only synthesizes a path-derived ID for paths it has
/// never seen.
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    by_path: HashMap<String, String>,
}

impl PathIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every directory whose path can be computed.
    ///
    /// Directories with broken chains are skipped with a warning.
    pub fn from_directories(directories: &[Directory]) -> Self {
        let dirs: HashMap<&str, &Directory> =
            directories.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut index = Self::new();
        for dir in directories {
            match directory_path(dir, &dirs) {
                Ok(path) => {
                    index.by_path.insert(path, dir.id.clone());
                }
                Err(err) => warn!(id = %dir.id, error = %err, "skipping unindexable directory"),
            }
        }
        index
    }

    /// Local ID for a directory path, if known.
    pub fn id_for(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// Returns true if the path is known.
    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Records a directory path.
    pub fn insert(&mut self, path: impl Into<String>, id: impl Into<String>) {
        self.by_path.insert(path.into(), id.into());
    }

    /// Forgets a directory path, returning its ID.
    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.by_path.remove(path)
    }

    /// Returns the ID for a path, synthesizing one if the path is unknown.
    ///
    /// The boolean is true when the ID was synthesized.
    pub fn ensure(&mut self, path: &str) -> (String, bool) {
        if let Some(id) = self.by_path.get(path) {
            return (id.clone(), false);
        }
        let id = path_to_id(path);
        self.by_path.insert(path.to_string(), id.clone());
        (id, true)
    }

    /// Number of known paths.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Returns true if no paths are known.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
