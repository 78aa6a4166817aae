//! In-memory object store for testing.

use crate::backend::{validate_key, ObjectStore};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A write recorded by [`InMemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// An object was written.
    Put(String),
    /// An object was removed.
    Delete(String),
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining successful puts before every put fails.
    puts_left: Option<usize>,
    /// Status returned by every operation.
    status: Option<u16>,
}

/// An in-memory object store.
///
/// This store keeps all objects in memory and is suitable for:
/// - Unit tests
/// - Integration tests between two engines sharing one "bucket"
/// - Reproducing partial remote failures
///
/// Every successful write is recorded so tests can assert the order in
/// which the engine touched the remote.
///
/// # Example
///
/// ```rust
/// use snipsync_store::{InMemoryObjectStore, ObjectStore};
///
/// let store = InMemoryObjectStore::new();
/// store.put("a", b"1").unwrap();
/// assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
/// store.delete("a").unwrap();
/// assert!(!store.exists("a").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: RwLock<Vec<StoreWrite>>,
    faults: RwLock<Faults>,
}

impl InMemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns the successful writes in the order they happened.
    #[must_use]
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes.read().clone()
    }

    /// Forgets the recorded writes.
    pub fn clear_writes(&self) {
        self.writes.write().clear();
    }

    /// Lets `n` more puts succeed, then fails every put as unavailable.
    pub fn fail_puts_after(&self, n: usize) {
        self.faults.write().puts_left = Some(n);
    }

    /// Fails every operation with the given HTTP-class status.
    pub fn fail_with_status(&self, status: u16) {
        self.faults.write().status = Some(status);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        *self.faults.write() = Faults::default();
    }

    fn check_status(&self) -> StoreResult<()> {
        match self.faults.read().status {
            Some(status) => Err(StoreError::http(status, "injected failure")),
            None => Ok(()),
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        self.check_status()?;
        Ok(self.objects.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.check_status()?;
        {
            let mut faults = self.faults.write();
            if let Some(left) = faults.puts_left.as_mut() {
                if *left == 0 {
                    return Err(StoreError::Unavailable(format!(
                        "injected put failure for {key}"
                    )));
                }
                *left -= 1;
            }
        }
        self.objects.write().insert(key.to_string(), data.to_vec());
        self.writes.write().push(StoreWrite::Put(key.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.check_status()?;
        if self.objects.write().remove(key).is_some() {
            self.writes.write().push(StoreWrite::Delete(key.to_string()));
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        self.check_status()?;
        Ok(self.objects.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryObjectStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
        assert!(!store.exists("missing").unwrap());
    }

    #[test]
    fn memory_put_replaces() {
        let store = InMemoryObjectStore::new();
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_delete_absent_is_ok() {
        let store = InMemoryObjectStore::new();
        store.delete("nothing/here").unwrap();
        assert!(store.writes().is_empty());
    }

    #[test]
    fn memory_records_writes_in_order() {
        let store = InMemoryObjectStore::new();
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();
        store.delete("a").unwrap();

        assert_eq!(
            store.writes(),
            vec![
                StoreWrite::Put("a".into()),
                StoreWrite::Put("b".into()),
                StoreWrite::Delete("a".into()),
            ]
        );
        assert_eq!(store.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn memory_fail_puts_after() {
        let store = InMemoryObjectStore::new();
        store.fail_puts_after(1);

        store.put("a", b"1").unwrap();
        let err = store.put("b", b"2").unwrap_err();
        assert!(err.is_transient());
        assert!(!store.exists("b").unwrap());

        store.clear_failures();
        store.put("b", b"2").unwrap();
    }

    #[test]
    fn memory_fail_with_status() {
        let store = InMemoryObjectStore::new();
        store.fail_with_status(403);
        let err = store.get("a").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn memory_rejects_bad_keys() {
        let store = InMemoryObjectStore::new();
        assert!(matches!(
            store.put("../escape", b"x"),
            Err(StoreError::InvalidKey { .. })
        ));
    }
}
