//! Transport layer abstraction for bulk transfer.

use crate::bulk::{BulkAck, BulkSnapshot, BulkUpload, IdAssignment};
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use sshconf_core::RecordId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A bulk transport moves whole record sets to and from the remote service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-memory, mock for testing, etc.).
pub trait BulkTransport: Send + Sync {
    /// Fetches remote changes since `last_synced`, or everything when the
    /// cursor is `None`.
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot>;

    /// Sends local changes and returns the remote acknowledgement.
    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &T {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        (**self).get_bulk(last_synced)
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        (**self).post_bulk(upload)
    }
}

impl<T: BulkTransport + ?Sized> BulkTransport for Box<T> {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        (**self).get_bulk(last_synced)
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        (**self).post_bulk(upload)
    }
}

/// A mock transport for testing.
///
/// Returns canned responses and records every upload it receives.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    snapshot: Mutex<Option<BulkSnapshot>>,
    ack: Mutex<Option<BulkAck>>,
    cursors: Mutex<Vec<Option<String>>>,
    uploads: Mutex<Vec<BulkUpload>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            snapshot: Mutex::new(None),
            ack: Mutex::new(None),
            cursors: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Sets the snapshot returned by `get_bulk`.
    pub fn set_snapshot(&self, snapshot: BulkSnapshot) {
        *self.snapshot.lock() = Some(snapshot);
    }

    /// Sets the acknowledgement returned by `post_bulk`.
    pub fn set_ack(&self, ack: BulkAck) {
        *self.ack.lock() = Some(ack);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the cursors passed to `get_bulk`, oldest first.
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().clone()
    }

    /// Returns the uploads received, oldest first.
    pub fn uploads(&self) -> Vec<BulkUpload> {
        self.uploads.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkTransport for MockTransport {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.cursors.lock().push(last_synced.map(str::to_string));
        self.snapshot
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock snapshot set".into()))
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        self.uploads.lock().push(upload.clone());
        self.ack
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock ack set".into()))
    }
}

/// A remote that holds nothing and accepts everything.
///
/// `get_bulk` returns an empty snapshot. `post_bulk` keeps remote ids,
/// numbers local ids from a counter and confirms every deletion.
#[derive(Debug)]
pub struct EchoTransport {
    next_id: AtomicU64,
}

impl EchoTransport {
    /// Creates an echo transport numbering new records from 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an echo transport numbering new records from `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
        }
    }
}

impl Default for EchoTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkTransport for EchoTransport {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        Ok(BulkSnapshot {
            last_synced: last_synced.map(str::to_string),
            ..BulkSnapshot::default()
        })
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        let mut accepted = Vec::with_capacity(upload.record_count());
        for (set_name, records) in &upload.sets {
            for record in records {
                let Some(sent) = record.id() else {
                    return Err(SyncError::protocol(format!(
                        "{set_name} record sent without an id"
                    )));
                };
                let assigned = match sent {
                    RecordId::Remote(_) => sent,
                    RecordId::Local(_) => {
                        RecordId::Remote(self.next_id.fetch_add(1, Ordering::SeqCst))
                    }
                };
                accepted.push(IdAssignment {
                    set_name: set_name.clone(),
                    sent,
                    assigned,
                });
            }
        }
        Ok(BulkAck {
            accepted,
            deleted: upload.deleted.clone(),
            last_synced: upload.last_synced.clone(),
        })
    }
}
