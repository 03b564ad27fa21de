//! # sshconf Storage
//!
//! Persistent key-value driver for sshconf.
//!
//! A driver maps a **set name** to an ordered sequence of raw records. It is
//! the only component that touches durable storage. Drivers do not know
//! about models, identifiers or strategies; they keep the whole mapping in
//! memory and write it out on [`Driver::sync`].
//!
//! ## Available Drivers
//!
//! - [`FileDriver`] - CBOR file written with temp-file-then-rename
//! - [`MemoryDriver`] - For tests and throwaway sessions
//!
//! ## Example
//!
//! ```rust
//! use sshconf_storage::{Driver, MemoryDriver, RawRecord, Value};
//!
//! let mut driver = MemoryDriver::new();
//! let mut record = RawRecord::new();
//! record.insert("label", Value::from("bastion"));
//! driver.setdefault("host", Vec::new()).push(record);
//! assert_eq!(driver.get("host").map(|set| set.len()), Some(1));
//! driver.sync().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod file;
mod memory;
mod value;

pub use driver::{Driver, Sets};
pub use error::{StorageError, StorageResult};
pub use file::FileDriver;
pub use memory::MemoryDriver;
pub use value::{RawRecord, RecordId, RecordSet, Value};
