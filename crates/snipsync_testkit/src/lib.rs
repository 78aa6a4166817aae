//! # Snipsync Testkit
//!
//! Test utilities for Snipsync.
//!
//! This crate provides:
//! - Library builders and ready-made test devices
//! - Recording listeners and a fake repository workspace
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snipsync_testkit::prelude::*;
//!
//! #[test]
//! fn two_devices_converge() {
//!     let remote = Arc::new(InMemoryObjectStore::new());
//!     let clock = test_clock();
//!     let a = TestDevice::new(&remote, "a", LibraryBuilder::new().snippet("x.snippet", "1").build(), clock.clone());
//!     let b = TestDevice::new(&remote, "b", Library::default(), clock);
//!     a.sync_ok();
//!     b.sync_ok();
//!     assert_eq!(b.code("x.snippet").as_deref(), Some("1"));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use snipsync_store::InMemoryObjectStore;
    pub use std::sync::Arc;
}

pub use fixtures::*;
pub use generators::*;
