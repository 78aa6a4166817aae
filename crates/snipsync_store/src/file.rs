//! Directory-backed object store.

use crate::backend::{validate_key, ObjectStore};
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An object store that emulates a bucket with a local directory.
///
/// Each key maps to a file below the root directory; slashes in keys become
/// sub-directories. This is how the CLI talks to a synced folder, a mounted
/// bucket or a checked-out repository.
///
/// # Durability
///
/// - `put` writes a sibling temp file, syncs it, then renames it over the
///   target, so readers never observe a half-written object
/// - `delete` prunes directories left empty, up to (not including) the root
///
/// # Thread Safety
///
/// Writes are serialized by an internal lock. Reads are lock-free.
///
/// # Example
///
/// ```no_run
/// use snipsync_store::{DirectoryObjectStore, ObjectStore};
/// use std::path::Path;
///
/// let store = DirectoryObjectStore::open(Path::new("bucket")).unwrap();
/// store.put("sync/metadata.json", b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct DirectoryObjectStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DirectoryObjectStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // remove_dir only succeeds on empty directories
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl ObjectStore for DirectoryObjectStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.object_path(key)?;
        let _guard = self.write_lock.lock();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = data.len(), "object written");
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.object_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "object deleted");
                self.prune_empty_parents(&path);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.object_path(key)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    #[test]
    fn directory_put_and_get() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();

        store.put("snippets/rust/iter.snippet", b"{}").unwrap();
        assert!(dir.path().join("snippets/rust/iter.snippet").is_file());
        assert_eq!(
            store.get("snippets/rust/iter.snippet").unwrap(),
            Some(b"{}".to_vec())
        );
    }

    #[test]
    fn directory_get_missing() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        assert_eq!(store.get("nope").unwrap(), None);
        assert!(!store.exists("nope").unwrap());
    }

    #[test]
    fn directory_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();

        store.put("a.json", b"1").unwrap();
        store.put("a.json", b"2").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
        assert_eq!(store.get("a.json").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn directory_delete_prunes_empty_dirs() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();

        store.put("snippets/a/b/c.snippet", b"x").unwrap();
        store.put("snippets/keep.snippet", b"y").unwrap();
        store.delete("snippets/a/b/c.snippet").unwrap();

        assert!(!dir.path().join("snippets/a").exists());
        assert!(dir.path().join("snippets").is_dir());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn directory_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        store.delete("never/written").unwrap();
    }

    #[test]
    fn directory_persistence() {
        let dir = tempdir().unwrap();
        {
            let store = DirectoryObjectStore::open(dir.path()).unwrap();
            store.put("sync/history.log", b"data").unwrap();
        }
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        assert_eq!(store.get("sync/history.log").unwrap(), Some(b"data".to_vec()));
    }

    #[test]
    fn directory_rejects_escaping_keys() {
        let dir = tempdir().unwrap();
        let store = DirectoryObjectStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("../outside"),
            Err(StoreError::InvalidKey { .. })
        ));
    }

    proptest::proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn valid_keys_stay_under_root(
            segments in proptest::collection::vec("[a-z0-9_ .-]{1,8}", 1..4),
            data in proptest::collection::vec(proptest::num::u8::ANY, 0..64),
        ) {
            proptest::prop_assume!(segments.iter().all(|s| s != "." && s != ".."));
            let dir = tempdir().unwrap();
            let store = DirectoryObjectStore::open(dir.path()).unwrap();
            let key = segments.join("/");

            store.put(&key, &data).unwrap();
            let path = store.object_path(&key).unwrap();
            proptest::prop_assert!(path.starts_with(dir.path()));
            proptest::prop_assert_eq!(store.get(&key).unwrap(), Some(data));
        }
    }
}
