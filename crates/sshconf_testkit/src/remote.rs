//! An in-memory stand-in for the remote bulk service.

use parking_lot::Mutex;
use sshconf_core::{Record, RecordId, RecordKey, Value};
use sshconf_sync_engine::{
    BulkAck, BulkSnapshot, BulkTransport, BulkUpload, IdAssignment, SyncError, SyncResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct Stored {
    record: Record,
    version: u64,
}

#[derive(Debug, Default)]
struct RemoteState {
    version: u64,
    next_id: u64,
    sets: BTreeMap<String, BTreeMap<u64, Stored>>,
    deletions: Vec<(u64, RecordKey)>,
    posts: usize,
}

/// A remote service holding record sets in memory.
///
/// Cursors are version numbers: every post bumps the version, and a pull
/// returns records and deletions newer than the cursor it was given.
/// Local ids in a post are replaced by fresh remote ids, including foreign
/// keys pointing at records of the same post.
#[derive(Debug)]
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    connected: AtomicBool,
}

impl InMemoryRemote {
    /// Creates an empty remote.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                next_id: 1,
                ..RemoteState::default()
            }),
            connected: AtomicBool::new(true),
        }
    }

    /// Sets the connected state; while disconnected every call fails with
    /// [`SyncError::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Stores a record as if another client had pushed it and returns its
    /// remote id.
    pub fn insert(&self, mut record: Record) -> RecordId {
        let mut state = self.state.lock();
        state.version += 1;
        let id = match record.id() {
            Some(RecordId::Remote(id)) => id,
            _ => state.allocate(),
        };
        record.take_related();
        record.set_id(RecordId::Remote(id));
        let version = state.version;
        state
            .sets
            .entry(record.set_name().to_string())
            .or_default()
            .insert(id, Stored { record, version });
        RecordId::Remote(id)
    }

    /// Deletes a record as if another client had deleted it.
    pub fn delete(&self, set_name: &str, id: RecordId) -> bool {
        let mut state = self.state.lock();
        state.version += 1;
        state.remove(set_name, id)
    }

    /// Returns the stored records of a set, ordered by id.
    pub fn records(&self, set_name: &str) -> Vec<Record> {
        self.state
            .lock()
            .sets
            .get(set_name)
            .map(|set| set.values().map(|s| s.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of stored records in a set.
    pub fn count(&self, set_name: &str) -> usize {
        self.state.lock().sets.get(set_name).map_or(0, BTreeMap::len)
    }

    /// Returns the number of stored records across sets.
    pub fn total(&self) -> usize {
        self.state.lock().sets.values().map(BTreeMap::len).sum()
    }

    /// Returns the current version.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    /// Returns the number of posts received.
    pub fn posts(&self) -> usize {
        self.state.lock().posts
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteState {
    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn remove(&mut self, set_name: &str, id: RecordId) -> bool {
        let Some(remote) = id.remote() else {
            return false;
        };
        let removed = self
            .sets
            .get_mut(set_name)
            .and_then(|set| set.remove(&remote))
            .is_some();
        if removed {
            self.deletions
                .push((self.version, RecordKey::new(set_name, id)));
        }
        removed
    }
}

fn rewrite_local(
    value: &Value,
    target: &str,
    ids: &HashMap<RecordKey, RecordId>,
) -> SyncResult<Value> {
    match value {
        Value::Id(id @ RecordId::Local(_)) => ids
            .get(&RecordKey::new(target, *id))
            .copied()
            .map(Value::Id)
            .ok_or_else(|| SyncError::protocol(format!("unknown {target} reference {id}"))),
        Value::List(items) => items
            .iter()
            .map(|item| rewrite_local(item, target, ids))
            .collect::<SyncResult<Vec<_>>>()
            .map(Value::List),
        other => Ok(other.clone()),
    }
}

impl BulkTransport for InMemoryRemote {
    fn get_bulk(&self, last_synced: Option<&str>) -> SyncResult<BulkSnapshot> {
        self.check_connected()?;
        let since = match last_synced {
            None => 0,
            Some(cursor) => cursor
                .parse::<u64>()
                .map_err(|_| SyncError::protocol(format!("invalid cursor {cursor}")))?,
        };
        let state = self.state.lock();
        let mut snapshot = BulkSnapshot {
            last_synced: Some(state.version.to_string()),
            ..BulkSnapshot::default()
        };
        for (set_name, set) in &state.sets {
            let changed: Vec<_> = set
                .values()
                .filter(|s| s.version > since)
                .map(|s| s.record.clone())
                .collect();
            if !changed.is_empty() {
                snapshot.sets.insert(set_name.clone(), changed);
            }
        }
        if since > 0 {
            for (version, key) in &state.deletions {
                if *version > since {
                    snapshot
                        .deleted
                        .entry(key.set_name.clone())
                        .or_default()
                        .push(key.id);
                }
            }
        }
        Ok(snapshot)
    }

    fn post_bulk(&self, upload: &BulkUpload) -> SyncResult<BulkAck> {
        self.check_connected()?;
        let mut state = self.state.lock();
        state.posts += 1;
        state.version += 1;
        let version = state.version;

        let mut ids = HashMap::new();
        let mut batch = Vec::with_capacity(upload.record_count());
        for (set_name, records) in &upload.sets {
            for record in records {
                let sent = record.id().ok_or_else(|| {
                    SyncError::protocol(format!("{set_name} record sent without an id"))
                })?;
                let assigned = match sent {
                    RecordId::Remote(id) => id,
                    RecordId::Local(_) => state.allocate(),
                };
                ids.insert(RecordKey::new(set_name.as_str(), sent), RecordId::Remote(assigned));
                batch.push((record, sent, assigned));
            }
        }

        // Resolve every reference before storing anything.
        let mut stored = Vec::with_capacity(batch.len());
        let mut accepted = Vec::with_capacity(batch.len());
        for (record, sent, assigned) in batch {
            let mut copy = record.clone();
            copy.take_related();
            for relation in record.schema().relations {
                if let Some(value) = record.get(relation.field) {
                    copy.set(relation.field, rewrite_local(value, relation.target.set_name, &ids)?);
                }
            }
            copy.set_id(RecordId::Remote(assigned));
            accepted.push(IdAssignment {
                set_name: record.set_name().to_string(),
                sent,
                assigned: RecordId::Remote(assigned),
            });
            stored.push((assigned, copy));
        }
        for (id, record) in stored {
            state
                .sets
                .entry(record.set_name().to_string())
                .or_default()
                .insert(id, Stored { record, version });
        }

        let mut deleted = BTreeMap::new();
        for (set_name, removed) in &upload.deleted {
            for id in removed {
                state.remove(set_name, *id);
            }
            deleted.insert(set_name.clone(), removed.clone());
        }

        Ok(BulkAck {
            accepted,
            deleted,
            last_synced: Some(version.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sshconf_core::{Host, Model, Tag};

    #[test]
    fn post_assigns_ids_and_links_batch() {
        let remote = InMemoryRemote::new();
        let group_id = RecordId::new_local();
        let mut group = sshconf_core::Group::new("prod").into_record();
        group.set_id(group_id);
        let mut host = Host::new("web", "10.0.0.1").into_record();
        host.set_id(RecordId::new_local());
        host.set("group", group_id);

        let mut upload = BulkUpload::default();
        upload.sets.insert("group".into(), vec![group]);
        upload.sets.insert("host".into(), vec![host]);
        let ack = remote.post_bulk(&upload).unwrap();

        assert_eq!(ack.accepted.len(), 2);
        assert!(ack.accepted.iter().all(|a| a.assigned.is_remote()));
        let stored_host = &remote.records("host")[0];
        let stored_group = &remote.records("group")[0];
        assert_eq!(stored_host.reference("group"), stored_group.id());
    }

    #[test]
    fn dangling_local_reference_is_rejected() {
        let remote = InMemoryRemote::new();
        let mut host = Host::new("web", "10.0.0.1").into_record();
        host.set_id(RecordId::new_local());
        host.set("group", RecordId::new_local());
        let mut upload = BulkUpload::default();
        upload.sets.insert("host".into(), vec![host]);
        assert!(matches!(remote.post_bulk(&upload), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn pulls_are_incremental() {
        let remote = InMemoryRemote::new();
        remote.insert(Tag::new("a").into_record());
        let first = remote.get_bulk(None).unwrap();
        assert_eq!(first.record_count(), 1);

        let b = remote.insert(Tag::new("b").into_record());
        let second = remote.get_bulk(first.last_synced.as_deref()).unwrap();
        assert_eq!(second.record_count(), 1);
        assert_eq!(second.sets["tag"][0].id(), Some(b));

        remote.delete("tag", b);
        let third = remote.get_bulk(second.last_synced.as_deref()).unwrap();
        assert_eq!(third.deleted["tag"], vec![b]);
        assert_eq!(remote.count("tag"), 1);
    }

    #[test]
    fn disconnected_remote() {
        let remote = InMemoryRemote::new();
        remote.set_connected(false);
        assert!(matches!(remote.get_bulk(None), Err(SyncError::NotConnected)));
        assert!(matches!(remote.get_bulk(Some("x")), Err(SyncError::NotConnected)));
        remote.set_connected(true);
        assert!(matches!(remote.get_bulk(Some("x")), Err(SyncError::Protocol(_))));
    }
}
