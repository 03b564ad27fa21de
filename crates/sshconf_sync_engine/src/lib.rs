//! # sshconf Sync Engine
//!
//! Reconciliation of local sshconf storage with the remote bulk service.
//!
//! This crate provides:
//! - Push, pull and full-clean over [`ApplicationStorage`](sshconf_core::ApplicationStorage)
//! - Conflict policies for records changed on both sides
//! - The [`BulkTransport`] abstraction with HTTP, mock and echo transports
//! - JSON encoding of bulk documents
//! - Named import services
//!
//! ## Architecture
//!
//! Local changes are tracked by the storage's save and delete strategies
//! as dirty markers and tombstones. A push sends both and applies the
//! acknowledgement; a pull merges the remote snapshot since the stored
//! cursor. A full clean is pull, delete everything, push.
//!
//! ## Key Invariants
//!
//! - Records are re-keyed to remote ids only on acknowledgement
//! - Dirty markers are cleared only for acknowledged records
//! - Tombstones sent by a push are dropped afterwards
//! - Transport errors propagate unmodified; nothing is retried internally
//!
//! ## Example
//!
//! ```rust
//! use sshconf_core::{ApplicationStorage, Host, StorageConfig};
//! use sshconf_sync_engine::{EchoTransport, Reconciler, SyncConfig};
//!
//! let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
//! storage.save(Host::new("web", "10.0.0.1")).unwrap();
//!
//! let reconciler = Reconciler::new(EchoTransport::new(), SyncConfig::default());
//! let report = reconciler.push(&mut storage).unwrap();
//! assert_eq!(report.pushed, 1);
//! assert!(storage.pending().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod error;
mod http;
mod reconcile;
mod service;
mod transport;
pub mod wire;

pub use bulk::{
    from_tombstones, to_tombstones, BulkAck, BulkSnapshot, BulkUpload, DeletedSets, IdAssignment,
};
pub use config::{ConflictPolicy, SyncConfig, DEFAULT_API_URL};
pub use error::{SyncError, SyncResult};
pub use http::{HttpBulkTransport, HttpClient, HttpResponse, BULK_ENDPOINT};
pub use reconcile::{CleanReport, PullReport, PushReport, Reconciler};
pub use service::{
    HostsJsonService, ServiceConstructor, ServiceRegistry, ServiceReport, SyncService,
};
pub use transport::{BulkTransport, EchoTransport, MockTransport};
