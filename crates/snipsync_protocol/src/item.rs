//! Library items in their two schema variants.
//!
//! The local store addresses items by ID and parent link ([`Snippet`],
//! [`Directory`]). Remote objects, exports and working trees use the
//! self-describing variant addressed by full path ([`PathSnippet`],
//! [`PathDirectory`]). Converting between the two is lossless as long as the
//! directory inventory is consistent; IDs on the way back are derived from
//! paths so every device arrives at the same ones.

use crate::error::ProtocolResult;
use crate::path::{directory_path, leaf_name, parent_path, path_to_id, snippet_name_from_path, snippet_path};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A code snippet as held by the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Stable local identifier.
    pub id: String,
    /// Display name (no slashes).
    pub name: String,
    /// Snippet body.
    pub code: String,
    /// Language identifier, e.g. `rust`.
    pub language: String,
    /// Containing directory, `None` at the root.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Display order among siblings.
    #[serde(default)]
    pub order: i64,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub create_time: i64,
}

/// A directory as held by the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// Stable local identifier.
    pub id: String,
    /// Display name (no slashes).
    pub name: String,
    /// Containing directory, `None` at the root.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Display order among siblings.
    #[serde(default)]
    pub order: i64,
}

/// Every item of a local store, parent-link addressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// All snippets.
    pub snippets: Vec<Snippet>,
    /// All directories.
    pub directories: Vec<Directory>,
}

impl Library {
    /// Creates a library from its parts.
    pub fn new(snippets: Vec<Snippet>, directories: Vec<Directory>) -> Self {
        Self {
            snippets,
            directories,
        }
    }

    /// Returns true if the library has no items.
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty() && self.directories.is_empty()
    }

    /// Indexes directories by ID.
    pub fn directory_map(&self) -> HashMap<&str, &Directory> {
        self.directories.iter().map(|d| (d.id.as_str(), d)).collect()
    }

    /// Converts to the full-path addressed schema.
    ///
    /// # Errors
    ///
    /// Fails if any item has an invalid name or a broken parent chain.
    pub fn to_path_library(&self) -> ProtocolResult<PathLibrary> {
        let dirs = self.directory_map();
        let mut out = PathLibrary::default();
        for dir in &self.directories {
            out.directories.push(PathDirectory {
                full_path: directory_path(dir, &dirs)?,
                name: dir.name.clone(),
                order: dir.order,
            });
        }
        for snippet in &self.snippets {
            out.snippets.push(PathSnippet::from_snippet(
                snippet,
                snippet_path(snippet, &dirs)?,
            ));
        }
        Ok(out)
    }
}

/// A snippet addressed by its full path; also the remote object body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSnippet {
    /// Full canonical path, ending in the snippet suffix.
    pub full_path: String,
    /// Display name.
    pub name: String,
    /// Snippet body.
    pub code: String,
    /// Language identifier.
    pub language: String,
    /// Display order among siblings.
    #[serde(default)]
    pub order: i64,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub create_time: i64,
}

impl PathSnippet {
    /// Builds the path-addressed form of a snippet whose path is known.
    pub fn from_snippet(snippet: &Snippet, full_path: String) -> Self {
        Self {
            full_path,
            name: snippet.name.clone(),
            code: snippet.code.clone(),
            language: snippet.language.clone(),
            order: snippet.order,
            create_time: snippet.create_time,
        }
    }

    /// Builds the parent-link form, with IDs derived from the path.
    ///
    /// The name is taken from the path so the two can never disagree.
    pub fn to_snippet(&self) -> Snippet {
        Snippet {
            id: path_to_id(&self.full_path),
            name: snippet_name_from_path(&self.full_path)
                .unwrap_or(self.name.as_str())
                .to_string(),
            code: self.code.clone(),
            language: self.language.clone(),
            parent_id: parent_path(&self.full_path).map(path_to_id),
            order: self.order,
            create_time: self.create_time,
        }
    }

    /// Encodes as the JSON object body stored remotely.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a remote object body.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a snippet object.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A directory addressed by its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDirectory {
    /// Full canonical path, ending in `/`.
    pub full_path: String,
    /// Display name.
    pub name: String,
    /// Display order among siblings.
    #[serde(default)]
    pub order: i64,
}

impl PathDirectory {
    /// Builds the parent-link form, with IDs derived from the path.
    pub fn to_directory(&self) -> Directory {
        Directory {
            id: path_to_id(&self.full_path),
            name: leaf_name(&self.full_path).to_string(),
            parent_id: parent_path(&self.full_path).map(path_to_id),
            order: self.order,
        }
    }
}

/// Every item of a library, full-path addressed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLibrary {
    /// All snippets.
    pub snippets: Vec<PathSnippet>,
    /// All directories.
    pub directories: Vec<PathDirectory>,
}

impl PathLibrary {
    /// Converts to the parent-link schema.
    ///
    /// Directories implied by a path but missing from the inventory are
    /// synthesized, so the result always has a consistent parent chain.
    pub fn to_library(&self) -> Library {
        let mut directories: Vec<Directory> =
            self.directories.iter().map(PathDirectory::to_directory).collect();
        let mut known: std::collections::HashSet<String> =
            self.directories.iter().map(|d| d.full_path.clone()).collect();

        let implied = self
            .directories
            .iter()
            .map(|d| d.full_path.as_str())
            .chain(self.snippets.iter().map(|s| s.full_path.as_str()));
        let mut missing = Vec::new();
        for path in implied {
            let mut parent = parent_path(path);
            while let Some(dir) = parent {
                if known.insert(dir.to_string()) {
                    missing.push(dir.to_string());
                }
                parent = parent_path(dir);
            }
        }
        for path in missing {
            directories.push(
                PathDirectory {
                    name: leaf_name(&path).to_string(),
                    full_path: path,
                    order: 0,
                }
                .to_directory(),
            );
        }

        Library {
            snippets: self.snippets.iter().map(PathSnippet::to_snippet).collect(),
            directories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(id: &str, name: &str, parent: Option<&str>) -> Directory {
        Directory {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(Into::into),
            order: 0,
        }
    }

    fn snippet(id: &str, name: &str, parent: Option<&str>) -> Snippet {
        Snippet {
            id: id.into(),
            name: name.into(),
            code: "fn main() {}".into(),
            language: "rust".into(),
            parent_id: parent.map(Into::into),
            order: 3,
            create_time: 1_700_000_000_000,
        }
    }

    #[test]
    fn path_library_roundtrip_preserves_content() {
        let library = Library::new(
            vec![snippet("s1", "hello", Some("d2")), snippet("s2", "top", None)],
            vec![dir("d1", "rust", None), dir("d2", "cli", Some("d1"))],
        );

        let paths = library.to_path_library().unwrap();
        let mut snippet_paths: Vec<_> = paths.snippets.iter().map(|s| s.full_path.as_str()).collect();
        snippet_paths.sort_unstable();
        assert_eq!(snippet_paths, vec!["rust/cli/hello.snippet", "top.snippet"]);

        let back = paths.to_library();
        assert_eq!(back.snippets.len(), 2);
        assert_eq!(back.directories.len(), 2);

        let again = back.to_path_library().unwrap();
        assert_eq!(again, paths);
    }

    #[test]
    fn to_library_synthesizes_missing_directories() {
        let paths = PathLibrary {
            snippets: vec![PathSnippet {
                full_path: "a/b/c.snippet".into(),
                name: "c".into(),
                code: String::new(),
                language: "text".into(),
                order: 0,
                create_time: 0,
            }],
            directories: vec![],
        };

        let library = paths.to_library();
        let mut names: Vec<_> = library.directories.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);

        let b = library.directories.iter().find(|d| d.name == "b").unwrap();
        assert_eq!(b.id, path_to_id("a/b/"));
        assert_eq!(b.parent_id.as_deref(), Some(path_to_id("a/").as_str()));
        assert_eq!(library.snippets[0].parent_id, Some(b.id.clone()));
    }

    #[test]
    fn object_json_roundtrip() {
        let object = PathSnippet::from_snippet(&snippet("s", "x", None), "x.snippet".into());
        let bytes = object.to_json().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"fullPath\""));
        assert_eq!(PathSnippet::from_json(&bytes).unwrap(), object);
    }

    #[test]
    fn object_json_rejects_garbage() {
        assert!(PathSnippet::from_json(b"not json").is_err());
    }
}
