//! Bulk transfer documents exchanged with the remote service.

use sshconf_core::{Record, RecordId, RecordKey, Tombstone};
use std::collections::BTreeMap;

/// Deleted record ids, grouped by set name.
pub type DeletedSets = BTreeMap<String, Vec<RecordId>>;

/// Remote state returned by a bulk get.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkSnapshot {
    /// Changed records per set name.
    pub sets: BTreeMap<String, Vec<Record>>,
    /// Records the remote side deleted since the cursor.
    pub deleted: DeletedSets,
    /// Cursor to pass on the next pull.
    pub last_synced: Option<String>,
}

impl BulkSnapshot {
    /// Returns the number of records carried.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }
}

/// Local changes sent by a bulk post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkUpload {
    /// Dirty records per set name.
    pub sets: BTreeMap<String, Vec<Record>>,
    /// Local deletions not yet confirmed.
    pub deleted: DeletedSets,
    /// Cursor the upload was built against.
    pub last_synced: Option<String>,
}

impl BulkUpload {
    /// Returns true if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.values().all(Vec::is_empty) && self.deleted.values().all(Vec::is_empty)
    }

    /// Returns the number of records carried.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    /// Returns the number of deletions carried.
    #[must_use]
    pub fn deletion_count(&self) -> usize {
        self.deleted.values().map(Vec::len).sum()
    }
}

/// The id the remote side stored a pushed record under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAssignment {
    /// Set name.
    pub set_name: String,
    /// Id the record was sent with.
    pub sent: RecordId,
    /// Id assigned by the remote side.
    pub assigned: RecordId,
}

impl IdAssignment {
    /// Returns true if the remote side kept the sent id.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.sent == self.assigned
    }
}

/// Remote acknowledgement of a bulk post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkAck {
    /// Records the remote side stored.
    pub accepted: Vec<IdAssignment>,
    /// Deletions the remote side confirmed.
    pub deleted: DeletedSets,
    /// Cursor after the post.
    pub last_synced: Option<String>,
}

/// Flattens deleted sets into tombstones, in set order.
#[must_use]
pub fn to_tombstones(deleted: &DeletedSets) -> Vec<Tombstone> {
    deleted
        .iter()
        .flat_map(|(set_name, ids)| ids.iter().map(move |id| RecordKey::new(set_name.clone(), *id)))
        .collect()
}

/// Groups tombstones by set name.
#[must_use]
pub fn from_tombstones(tombstones: &[Tombstone]) -> DeletedSets {
    let mut deleted = DeletedSets::new();
    for tombstone in tombstones {
        deleted
            .entry(tombstone.set_name.clone())
            .or_default()
            .push(tombstone.id);
    }
    deleted
}
