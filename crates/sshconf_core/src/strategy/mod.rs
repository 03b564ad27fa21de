//! Pluggable read, write and delete policies.
//!
//! Each policy is a trait with three built-in variants selected through
//! [`StorageConfig`](crate::StorageConfig). Strategies are stateless; the
//! [`RecordStore`] they act on is passed to every call.

mod delete;
mod get;
mod save;

pub use delete::{CascadeDelete, PlainDelete, SyncDelete};
pub use get::{InternalGet, RelatedGet};
pub use save::{CascadeSave, PlainSave, SyncSave};

use crate::config::{DeleteStrategyKind, GetStrategyKind, SaveStrategyKind};
use crate::error::CoreResult;
use crate::record::Record;
use crate::store::{RecordStore, Tombstone};

/// Resolves a stored record into a linked record graph.
pub trait GetStrategy: Send + Sync {
    /// Returns `record` with whatever related records this strategy
    /// resolves. Raw fields are never modified.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors. Dangling foreign keys
    /// are not an error.
    fn get(&self, record: Record, store: &RecordStore) -> CoreResult<Record>;
}

/// Prepares records for writing and marks them for sync.
pub trait SaveStrategy: Send + Sync {
    /// Returns the record to write.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnresolvedReference`](crate::CoreError::UnresolvedReference)
    /// when a related record is unsaved and the strategy does not persist
    /// related records.
    fn save(&self, record: Record, store: &mut RecordStore) -> CoreResult<Record>;

    /// Records sync bookkeeping for a record that was just written.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn mark(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()>;
}

/// Tracks deletions for later reconciliation.
pub trait DeleteStrategy: Send + Sync {
    /// Handles a record that was just removed from its set.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn delete(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()>;

    /// Drops local tombstones confirmed by the remote side and returns the
    /// ones still to be sent.
    ///
    /// # Errors
    ///
    /// Implementations may fail on storage errors.
    fn confirm_delete(
        &self,
        confirmed: &[Tombstone],
        store: &mut RecordStore,
    ) -> CoreResult<Vec<Tombstone>>;
}

/// Builds the get strategy for a configured kind.
#[must_use]
pub fn get_strategy(kind: GetStrategyKind) -> Box<dyn GetStrategy> {
    match kind {
        GetStrategyKind::Internal => Box::new(InternalGet),
        GetStrategyKind::Related => Box::new(RelatedGet::new()),
        GetStrategyKind::Shallow => Box::new(RelatedGet::with_max_depth(1)),
    }
}

/// Builds the save strategy for a configured kind.
#[must_use]
pub fn save_strategy(kind: SaveStrategyKind) -> Box<dyn SaveStrategy> {
    match kind {
        SaveStrategyKind::Plain => Box::new(PlainSave),
        SaveStrategyKind::Sync => Box::new(SyncSave),
        SaveStrategyKind::Cascade => Box::new(CascadeSave),
    }
}

/// Builds the delete strategy for a configured kind.
#[must_use]
pub fn delete_strategy(kind: DeleteStrategyKind) -> Box<dyn DeleteStrategy> {
    match kind {
        DeleteStrategyKind::Plain => Box::new(PlainDelete),
        DeleteStrategyKind::Sync => Box::new(SyncDelete),
        DeleteStrategyKind::Cascade => Box::new(CascadeDelete),
    }
}
