//! Driver trait definition and the shared in-memory set map.

use crate::error::StorageResult;
use crate::value::RecordSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A persistent mapping from set name to an ordered sequence of raw records.
///
/// Drivers hold every set in memory. Mutations become durable only on
/// [`Driver::sync`].
///
/// # Invariants
///
/// - `get` after `set` returns exactly the value that was set
/// - `sync` is idempotent and safe to call without pending mutations
/// - `rollback` restores the state of the last successful `sync` (or load)
///
/// # Concurrency
///
/// A driver assumes single-process, single-user access. Mutation of the
/// backing file by another process during a session is undefined behavior.
pub trait Driver: Send {
    /// Returns the set stored under `key`.
    fn get(&self, key: &str) -> Option<&RecordSet>;

    /// Returns the set stored under `key` for in-place mutation.
    ///
    /// The set is considered modified once borrowed.
    fn get_mut(&mut self, key: &str) -> Option<&mut RecordSet>;

    /// Replaces the set stored under `key`.
    fn set(&mut self, key: &str, value: RecordSet);

    /// Returns the set stored under `key`, inserting `default` first if
    /// the key is missing.
    fn setdefault(&mut self, key: &str, default: RecordSet) -> &mut RecordSet;

    /// Returns every stored key in name order.
    fn keys(&self) -> Vec<String>;

    /// Flushes all in-memory mutations to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails. The previous durable
    /// state is left intact in that case.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards in-memory mutations made since the last `sync`.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable state cannot be re-read.
    fn rollback(&mut self) -> StorageResult<()>;
}

/// The in-memory image of a record store, shared by all drivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sets {
    sets: BTreeMap<String, RecordSet>,
    #[serde(skip)]
    modified: bool,
}

impl Sets {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if anything changed since the image was loaded or
    /// last marked clean.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Marks the image as written.
    pub fn mark_clean(&mut self) {
        self.modified = false;
    }

    /// Returns the set stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RecordSet> {
        self.sets.get(key)
    }

    /// Returns the set stored under `key` mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut RecordSet> {
        let set = self.sets.get_mut(key);
        if set.is_some() {
            self.modified = true;
        }
        set
    }

    /// Replaces the set stored under `key`.
    pub fn set(&mut self, key: &str, value: RecordSet) {
        self.sets.insert(key.to_owned(), value);
        self.modified = true;
    }

    /// Returns the set under `key`, inserting `default` if missing.
    pub fn setdefault(&mut self, key: &str, default: RecordSet) -> &mut RecordSet {
        self.modified = true;
        self.sets.entry(key.to_owned()).or_insert(default)
    }

    /// Returns every key in name order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }

    /// Returns the total number of records across all sets.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{RawRecord, Value};

    fn record(label: &str) -> RawRecord {
        [("label", Value::from(label))].into_iter().collect()
    }

    #[test]
    fn setdefault_keeps_existing() {
        let mut sets = Sets::new();
        sets.set("tag", vec![record("a")]);
        let set = sets.setdefault("tag", Vec::new());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn setdefault_inserts_default() {
        let mut sets = Sets::new();
        sets.setdefault("tag", vec![record("a"), record("b")]);
        assert_eq!(sets.get("tag").map(Vec::len), Some(2));
    }

    #[test]
    fn modification_tracking() {
        let mut sets = Sets::new();
        assert!(!sets.is_modified());

        sets.set("host", Vec::new());
        assert!(sets.is_modified());

        sets.mark_clean();
        assert!(sets.get("host").is_some());
        assert!(!sets.is_modified());

        assert!(sets.get_mut("missing").is_none());
        assert!(!sets.is_modified());

        sets.get_mut("host").unwrap().push(record("x"));
        assert!(sets.is_modified());
    }

    #[test]
    fn keys_are_sorted() {
        let mut sets = Sets::new();
        sets.set("tag", Vec::new());
        sets.set("host", Vec::new());
        assert_eq!(sets.keys(), vec!["host".to_string(), "tag".to_string()]);
    }

    #[test]
    fn record_count_spans_sets() {
        let mut sets = Sets::new();
        sets.set("tag", vec![record("a")]);
        sets.set("host", vec![record("b"), record("c")]);
        assert_eq!(sets.record_count(), 3);
    }
}
