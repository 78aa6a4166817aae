//! Content hashing.
//!
//! Hashes cover a canonical subset of item fields. Volatile fields
//! (`create_time`, and `order` for snippets) are left out so metadata churn
//! never looks like a content change.
//!
//! Each hash is SHA-256 over the compact JSON of a fixed-field struct, so
//! the key order is the declaration order below and never depends on map
//! iteration.

use crate::item::{Directory, Snippet};
use crate::path::{parent_path, path_to_id};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnippetFields<'a> {
    id: &'a str,
    name: &'a str,
    code: &'a str,
    language: &'a str,
    parent_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryFields<'a> {
    id: &'a str,
    name: &'a str,
    parent_id: Option<&'a str>,
    order: i64,
}

fn content_hash<T: Serialize>(value: &T) -> String {
    // Borrowed strings and integers always serialize.
    let json = serde_json::to_vec(value).unwrap_or_default();
    format!("{:x}", Sha256::digest(&json))
}

/// Hash of a snippet over `{id, name, code, language, parentId}`.
pub fn snippet_hash(snippet: &Snippet) -> String {
    content_hash(&SnippetFields {
        id: &snippet.id,
        name: &snippet.name,
        code: &snippet.code,
        language: &snippet.language,
        parent_id: snippet.parent_id.as_deref(),
    })
}

/// Hash of a directory over `{id, name, parentId, order}`.
pub fn directory_hash(dir: &Directory) -> String {
    content_hash(&DirectoryFields {
        id: &dir.id,
        name: &dir.name,
        parent_id: dir.parent_id.as_deref(),
        order: dir.order,
    })
}

/// Hash of a snippet under its path identity.
///
/// `id` and `parentId` are replaced by the IDs derived from `path`, so two
/// devices holding the same content at the same path agree on the hash even
/// though their local IDs differ.
pub fn sync_snippet_hash(snippet: &Snippet, path: &str) -> String {
    let canonical = Snippet {
        id: path_to_id(path),
        parent_id: parent_path(path).map(path_to_id),
        ..snippet.clone()
    };
    snippet_hash(&canonical)
}

/// Hash of a directory under its path identity.
pub fn sync_directory_hash(dir: &Directory, path: &str) -> String {
    let canonical = Directory {
        id: path_to_id(path),
        parent_id: parent_path(path).map(path_to_id),
        ..dir.clone()
    };
    directory_hash(&canonical)
}

/// Hash of a history log's text, used as the remote change fingerprint.
pub fn history_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
