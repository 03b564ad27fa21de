//! # sshconf Core
//!
//! Local model storage for SSH configuration entities.
//!
//! This crate provides:
//! - Schema-bound records and typed models (hosts, groups, tags, keys, ...)
//! - Local identifier generation
//! - A declarative query engine (`"field.operator"` lookups)
//! - Pluggable get, save and delete strategies
//! - The [`ApplicationStorage`] facade with scoped sessions
//!
//! ## Example
//!
//! ```rust
//! use sshconf_core::{ApplicationStorage, Group, Host, Query, SaveStrategyKind, StorageConfig};
//!
//! let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
//! let mut storage = ApplicationStorage::in_memory(config).unwrap();
//!
//! storage
//!     .session(|s| {
//!         s.save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))?;
//!         s.save(Host::new("db", "10.0.0.2"))?;
//!         Ok::<_, sshconf_core::CoreError>(())
//!     })
//!     .unwrap();
//!
//! let hosts: Vec<Host> = storage.filter(&Query::new().with("address.contains", "10.0")).unwrap();
//! assert_eq!(hosts.len(), 2);
//! assert_eq!(storage.get_all::<Group>().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod id;
mod model;
mod query;
mod record;
mod schema;
mod storage;
mod store;
pub mod strategy;

pub use config::{
    expand_home, CommitPolicy, DeleteStrategyKind, GetStrategyKind, SaveStrategyKind,
    StorageConfig, DEFAULT_APPLICATION_NAME, DEFAULT_PATH_TEMPLATE,
};
pub use error::{CoreError, CoreResult};
pub use id::{IdGenerator, UuidGenerator};
pub use model::{
    Group, Host, Model, PfRule, Snippet, SshConfig, SshIdentity, SshKey, Tag, TagHost, GROUP,
    HOST, PF_RULE, SNIPPET, SSH_CONFIG, SSH_IDENTITY, SSH_KEY, TAG, TAG_HOST, TERMINAL_SCHEMAS,
};
pub use query::{Lookup, Operator, Query, Union};
pub use record::{Record, Related};
pub use schema::{Cardinality, Relation, SetSchema};
pub use storage::{ApplicationStorage, Merge};
pub use store::{RecordKey, RecordStore, Tombstone};
pub use strategy::{DeleteStrategy, GetStrategy, SaveStrategy};

pub use sshconf_storage::{RawRecord, RecordId, RecordSet, Value};
