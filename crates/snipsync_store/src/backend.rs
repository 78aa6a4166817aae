//! Object-store trait definition.

use crate::error::{StoreError, StoreResult};

/// A remote object store for snipsync.
///
/// Object stores are **opaque byte stores** addressed by key. They provide
/// the four operations a bucket or a version-controlled working copy can
/// offer without any server-side logic. snipsync owns all interpretation of
/// the stored bytes.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put`
/// - `delete` of an absent key is not an error
/// - `exists(key)` agrees with `get(key).is_some()`
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryObjectStore`] - For testing
/// - [`super::DirectoryObjectStore`] - For a local directory bucket
pub trait ObjectStore: Send + Sync {
    /// Reads the object stored under `key`.
    ///
    /// Returns `Ok(None)` when no object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes `data` under `key`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Removes the object stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Returns true if an object exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    fn exists(&self, key: &str) -> StoreResult<bool>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        (**self).put(key, data)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key)
    }
}

/// Checks that a key is a non-empty relative slash path without `.` or `..`
/// segments.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] describing the first problem found.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::invalid_key(key, "key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(StoreError::invalid_key(key, "key must be relative"));
    }
    if key.contains('\\') || key.contains('\0') {
        return Err(StoreError::invalid_key(key, "key contains a forbidden character"));
    }
    for segment in key.trim_end_matches('/').split('/') {
        match segment {
            "" => return Err(StoreError::invalid_key(key, "key has an empty segment")),
            "." | ".." => {
                return Err(StoreError::invalid_key(key, "key has a relative segment"))
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        assert!(validate_key("sync/history.log").is_ok());
        assert!(validate_key("snippets/rust/iter.snippet").is_ok());
        assert!(validate_key("metadata.json").is_ok());
    }

    #[test]
    fn invalid_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a\\b").is_err());
    }
}
