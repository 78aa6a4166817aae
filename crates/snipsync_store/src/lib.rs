//! # snipsync Store
//!
//! Remote object-store contract and backends for snipsync.
//!
//! The sync engine talks to its remote through a deliberately tiny
//! contract: `get`, `put`, `delete` and `exists` on opaque byte objects
//! addressed by string keys. Object stores have no server-side logic; every
//! rule about what the bytes mean lives in `snipsync_protocol`.
//!
//! ## Design Principles
//!
//! - Objects are opaque byte blobs
//! - Keys are slash-separated relative paths
//! - Deleting an absent key succeeds
//! - Must be `Send + Sync` so one store can back an engine and its tools
//!
//! ## Available Backends
//!
//! - [`InMemoryObjectStore`] - For testing, with failure injection
//! - [`DirectoryObjectStore`] - A bucket emulated by a local directory
//!
//! ## Example
//!
//! ```rust
//! use snipsync_store::{InMemoryObjectStore, ObjectStore};
//!
//! let store = InMemoryObjectStore::new();
//! store.put("sync/history.log", b"+ | a/ | h | 2024-01-01T00:00:00.000Z").unwrap();
//! assert!(store.exists("sync/history.log").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, ObjectStore};
pub use error::{StoreError, StoreResult};
pub use file::DirectoryObjectStore;
pub use memory::{InMemoryObjectStore, StoreWrite};
