//! In-memory driver for tests.

use crate::driver::{Driver, Sets};
use crate::error::StorageResult;
use crate::value::RecordSet;

/// A driver that keeps everything in memory.
///
/// `sync()` snapshots the current state so that `rollback()` behaves like
/// the file driver re-reading its last flushed file.
///
/// # Example
///
/// ```rust
/// use sshconf_storage::{Driver, MemoryDriver};
///
/// let mut driver = MemoryDriver::new();
/// driver.set("tag", Vec::new());
/// driver.rollback().unwrap();
/// assert!(driver.get("tag").is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryDriver {
    sets: Sets,
    committed: Sets,
    sync_count: usize,
}

impl MemoryDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver whose durable state is `sets`.
    ///
    /// Useful for reproducing a store left behind by an earlier run.
    #[must_use]
    pub fn with_sets(mut sets: Sets) -> Self {
        sets.mark_clean();
        Self {
            committed: sets.clone(),
            sets,
            sync_count: 0,
        }
    }

    /// Returns the last synced state.
    #[must_use]
    pub fn committed(&self) -> &Sets {
        &self.committed
    }

    /// Returns how many times `sync` was called.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.sync_count
    }
}

impl Driver for MemoryDriver {
    fn get(&self, key: &str) -> Option<&RecordSet> {
        self.sets.get(key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut RecordSet> {
        self.sets.get_mut(key)
    }

    fn set(&mut self, key: &str, value: RecordSet) {
        self.sets.set(key, value);
    }

    fn setdefault(&mut self, key: &str, default: RecordSet) -> &mut RecordSet {
        self.sets.setdefault(key, default)
    }

    fn keys(&self) -> Vec<String> {
        self.sets.keys()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.sets.mark_clean();
        self.committed = self.sets.clone();
        self.sync_count += 1;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.sets = self.committed.clone();
        Ok(())
    }
}
