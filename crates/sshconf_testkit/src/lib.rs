//! # sshconf Testkit
//!
//! Test utilities for sshconf.
//!
//! This crate provides:
//! - Storage fixtures, file-backed and in-memory
//! - A seeded record graph covering every terminal set
//! - Property-based test generators using proptest
//! - [`InMemoryRemote`], a bulk service for reconciliation tests
//! - [`LoopbackClient`], routing HTTP transport requests to it
//!
//! ## Usage
//!
//! ```rust
//! use sshconf_core::Tag;
//! use sshconf_sync_engine::{Reconciler, SyncConfig};
//! use sshconf_testkit::prelude::*;
//!
//! let remote = InMemoryRemote::new();
//! let reconciler = Reconciler::new(&remote, SyncConfig::default());
//! with_temp_storage(|storage| {
//!     storage.save(Tag::new("linux")).unwrap();
//!     reconciler.push(storage).unwrap();
//! });
//! assert_eq!(remote.count("tag"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod loopback;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::loopback::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use loopback::*;
pub use remote::*;
