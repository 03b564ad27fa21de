//! Push, pull and full-clean reconciliation.

use crate::bulk::{from_tombstones, to_tombstones, BulkUpload};
use crate::config::{ConflictPolicy, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::transport::BulkTransport;
use sshconf_core::{ApplicationStorage, Merge, Record, RecordKey, Related};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Result of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Records new to local storage.
    pub created: usize,
    /// Local records overwritten by remote copies.
    pub updated: usize,
    /// Local records removed because the remote side deleted them.
    pub deleted: usize,
    /// Remote records ignored (local tombstone or local change kept).
    pub skipped: usize,
    /// Remote records that were also changed locally.
    pub conflicts: usize,
    /// Cursor stored after the pull.
    pub last_synced: Option<String>,
}

/// Result of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records sent.
    pub sent: usize,
    /// Records the remote side acknowledged.
    pub pushed: usize,
    /// Local ids replaced by remote ids.
    pub reassigned: usize,
    /// Records sent but not acknowledged; they stay dirty.
    pub rejected: usize,
    /// Tombstones sent.
    pub deletions_sent: usize,
    /// Tombstones the remote side confirmed.
    pub deletions_confirmed: usize,
    /// Cursor reported by the remote side; only pulls store cursors.
    pub last_synced: Option<String>,
}

/// Result of a full clean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// The pull that ran first.
    pub pulled: PullReport,
    /// Records deleted per set, in deletion order.
    pub deleted: Vec<(String, usize)>,
    /// The push that propagated the deletions.
    pub pushed: PushReport,
}

impl CleanReport {
    /// Returns the number of records deleted locally.
    #[must_use]
    pub fn total_deleted(&self) -> usize {
        self.deleted.iter().map(|(_, count)| count).sum()
    }
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pulled: {} created, {} updated, {} deleted, {} skipped, {} conflicts",
            self.created, self.updated, self.deleted, self.skipped, self.conflicts
        )
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed: {}/{} records, {} reassigned, {}/{} deletions confirmed",
            self.pushed, self.sent, self.reassigned, self.deletions_confirmed, self.deletions_sent
        )
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.pulled)?;
        writeln!(f, "cleaned: {} records", self.total_deleted())?;
        write!(f, "{}", self.pushed)
    }
}

/// Drives [`ApplicationStorage`] and a [`BulkTransport`] to converge local
/// and remote record sets.
///
/// Every operation runs inside a storage session, so local changes are
/// flushed when it returns, successfully or not (see
/// [`ApplicationStorage::session`]). Operations are idempotent at the
/// record level and can be re-run after a partial failure.
pub struct Reconciler<T: BulkTransport> {
    transport: T,
    config: SyncConfig,
}

impl<T: BulkTransport> Reconciler<T> {
    /// Creates a reconciler.
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fetches remote changes and merges them into local storage.
    ///
    /// Remote deletions are applied first. Records with a local tombstone
    /// are skipped. Records dirty locally are resolved by the conflict
    /// policy. Merged records are not marked dirty.
    ///
    /// # Errors
    ///
    /// Returns transport errors unmodified, or [`SyncError::Protocol`] for a
    /// remote record without a remote id.
    pub fn pull(&self, storage: &mut ApplicationStorage) -> SyncResult<PullReport> {
        storage.session(|s| self.pull_in(s))
    }

    /// Sends dirty records and tombstones to the remote side.
    ///
    /// On acknowledgement, locally created records are re-keyed to their
    /// remote ids, dirty markers are cleared for acknowledged records only,
    /// and confirmed tombstones are dropped. Unconfirmed tombstones stay for
    /// the next push.
    /// The pull cursor is left alone.
    ///
    /// # Errors
    ///
    /// Returns transport errors unmodified; local state is then unchanged
    /// and the push can be retried.
    pub fn push(&self, storage: &mut ApplicationStorage) -> SyncResult<PushReport> {
        storage.session(|s| self.push_in(s))
    }

    /// Pulls, deletes every local record in deletion order, then pushes the
    /// resulting tombstones.
    ///
    /// # Errors
    ///
    /// Returns the first failing phase's error. Phases that completed stay
    /// flushed.
    pub fn full_clean(&self, storage: &mut ApplicationStorage) -> SyncResult<CleanReport> {
        let pulled = self.pull(storage)?;
        let deleted = storage.session(Self::clean_in)?;
        let pushed = self.push(storage)?;
        Ok(CleanReport {
            pulled,
            deleted,
            pushed,
        })
    }

    fn pull_in(&self, storage: &mut ApplicationStorage) -> SyncResult<PullReport> {
        let cursor = storage.sync_cursor();
        let snapshot = self.transport.get_bulk(cursor.as_deref())?;
        let mut report = PullReport::default();

        let mut removed = Vec::new();
        for key in to_tombstones(&snapshot.deleted) {
            let Ok(schema) = storage.schema(&key.set_name) else {
                warn!(set = %key.set_name, "ignoring deletion in unknown set");
                continue;
            };
            if storage.remove_remote(schema, key.id)? {
                report.deleted += 1;
            }
            removed.push(key);
        }
        storage.confirm_delete(&removed)?;

        for name in snapshot.sets.keys() {
            if storage.schema(name).is_err() {
                warn!(set = %name, "ignoring records of unknown set");
            }
        }

        let schemas = storage.schemas().to_vec();
        for schema in schemas {
            let Some(records) = snapshot.sets.get(schema.set_name) else {
                continue;
            };
            for record in records {
                let id = record.id().filter(|id| id.is_remote()).ok_or_else(|| {
                    SyncError::protocol(format!(
                        "remote {} record without a remote id",
                        schema.set_name
                    ))
                })?;
                if storage.is_tombstoned(schema, id) {
                    debug!(set = schema.set_name, %id, "skipping record deleted locally");
                    report.skipped += 1;
                    continue;
                }
                if storage.is_pending(schema, id) {
                    report.conflicts += 1;
                    match self.config.conflict_policy {
                        ConflictPolicy::ClientWins => {
                            debug!(set = schema.set_name, %id, "keeping local change");
                            report.skipped += 1;
                            continue;
                        }
                        ConflictPolicy::ServerWins => {
                            debug!(set = schema.set_name, %id, "dropping local change");
                            storage.clear_pending(&[RecordKey::new(schema.set_name, id)]);
                        }
                    }
                }
                match storage.merge_remote(record)? {
                    Merge::Inserted => report.created += 1,
                    Merge::Updated => report.updated += 1,
                }
            }
        }

        if let Some(cursor) = snapshot.last_synced.as_deref() {
            storage.set_sync_cursor(Some(cursor));
        }
        report.last_synced = storage.sync_cursor();
        info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            conflicts = report.conflicts,
            "pull complete"
        );
        Ok(report)
    }

    fn push_in(&self, storage: &mut ApplicationStorage) -> SyncResult<PushReport> {
        let mut upload = BulkUpload {
            last_synced: storage.sync_cursor(),
            ..BulkUpload::default()
        };
        let mut included = HashSet::new();
        let mut stale = Vec::new();
        for key in storage.pending() {
            let found = match storage.schema(&key.set_name) {
                Ok(schema) => storage.find_record(schema, key.id, self.config.push_resolution)?,
                Err(_) => None,
            };
            match found {
                Some(record) => collect(record, &mut upload, &mut included),
                None => stale.push(key),
            }
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "dropping markers of missing records");
            storage.clear_pending(&stale);
        }

        let tombstones = storage.tombstones();
        upload.deleted = from_tombstones(&tombstones);

        let mut report = PushReport {
            sent: upload.record_count(),
            deletions_sent: tombstones.len(),
            ..PushReport::default()
        };
        if upload.is_empty() {
            debug!("nothing to push");
            return Ok(report);
        }

        let ack = self.transport.post_bulk(&upload)?;

        let mut acknowledged = Vec::new();
        for assignment in &ack.accepted {
            if !included.contains(&RecordKey::new(assignment.set_name.as_str(), assignment.sent)) {
                warn!(
                    set = %assignment.set_name,
                    id = %assignment.sent,
                    "ignoring acknowledgement of a record not sent"
                );
                continue;
            }
            if assignment.assigned.is_local() {
                return Err(SyncError::protocol(format!(
                    "remote assigned a local id to a {} record",
                    assignment.set_name
                )));
            }
            let schema = storage.schema(&assignment.set_name)?;
            if !assignment.is_unchanged() && storage.contains(schema, assignment.sent) {
                storage.reassign_id(schema, assignment.sent, assignment.assigned)?;
                report.reassigned += 1;
            }
            acknowledged.push(RecordKey::new(schema.set_name, assignment.assigned));
            report.pushed += 1;
        }
        storage.clear_pending(&acknowledged);
        report.rejected = report.sent.saturating_sub(report.pushed);

        let confirmed = to_tombstones(&ack.deleted);
        report.deletions_confirmed = tombstones.iter().filter(|t| confirmed.contains(t)).count();
        let remaining = storage.confirm_delete(&confirmed)?;
        if !remaining.is_empty() {
            warn!(count = remaining.len(), "deletions not confirmed, kept for the next push");
        }

        report.last_synced = ack.last_synced;
        info!(
            sent = report.sent,
            pushed = report.pushed,
            reassigned = report.reassigned,
            rejected = report.rejected,
            deletions = report.deletions_sent,
            "push complete"
        );
        Ok(report)
    }

    fn clean_in(storage: &mut ApplicationStorage) -> SyncResult<Vec<(String, usize)>> {
        let schemas = storage.schemas().to_vec();
        let mut deleted = Vec::with_capacity(schemas.len());
        for schema in schemas {
            info!(set = schema.set_name, "start cleaning");
            let mut count = 0;
            for record in storage.raw_records(schema)? {
                // Cascading deletes may have removed it already.
                let Some(id) = record.id().filter(|id| storage.contains(schema, *id)) else {
                    continue;
                };
                debug!(set = schema.set_name, %id, "deleting");
                storage.delete_record(&record)?;
                count += 1;
            }
            info!(set = schema.set_name, count, "complete cleaning");
            deleted.push((schema.set_name.to_string(), count));
        }
        Ok(deleted)
    }
}

/// Adds a record to the upload, followed by any resolved related records
/// the remote side has never seen.
fn collect(mut record: Record, upload: &mut BulkUpload, included: &mut HashSet<RecordKey>) {
    let related = record.take_related();
    if let Some(id) = record.id() {
        if included.insert(RecordKey::new(record.set_name(), id)) {
            upload
                .sets
                .entry(record.set_name().to_string())
                .or_default()
                .push(record);
        }
    }
    for entry in related.into_values() {
        match entry {
            Related::One(Some(r)) if is_unseen(&r) => collect(*r, upload, included),
            Related::Many(records) => records
                .into_iter()
                .filter(is_unseen)
                .for_each(|r| collect(r, upload, included)),
            Related::One(_) => {}
        }
    }
}

fn is_unseen(record: &Record) -> bool {
    record.id().is_some_and(|id| id.is_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::{BulkAck, BulkSnapshot, IdAssignment};
    use crate::transport::{EchoTransport, MockTransport};
    use sshconf_core::{
        CommitPolicy, Group, Host, Model, Query, RecordId, SaveStrategyKind, StorageConfig, Tag,
        HOST, TAG,
    };

    fn storage() -> ApplicationStorage {
        ApplicationStorage::in_memory(StorageConfig::new()).unwrap()
    }

    fn remote_tag(id: u64, label: &str) -> Record {
        let mut tag = Tag::new(label).into_record();
        tag.set_id(RecordId::Remote(id));
        tag
    }

    fn snapshot_of(records: Vec<Record>) -> BulkSnapshot {
        let mut snapshot = BulkSnapshot::default();
        for record in records {
            snapshot
                .sets
                .entry(record.set_name().to_string())
                .or_default()
                .push(record);
        }
        snapshot.last_synced = Some("1".into());
        snapshot
    }

    #[test]
    fn pull_merges_without_marking() {
        let transport = MockTransport::new();
        transport.set_snapshot(snapshot_of(vec![remote_tag(1, "a"), remote_tag(2, "b")]));
        let reconciler = Reconciler::new(transport, SyncConfig::default());
        let mut storage = storage();

        let report = reconciler.pull(&mut storage).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.last_synced.as_deref(), Some("1"));
        assert!(storage.pending().is_empty());
        assert_eq!(storage.sync_cursor().as_deref(), Some("1"));

        // Second pull passes the cursor and updates in place.
        let report = reconciler.pull(&mut storage).unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(storage.count(&TAG), 2);
        assert_eq!(
            reconciler.transport().cursors(),
            vec![None, Some("1".to_string())]
        );
    }

    #[test]
    fn pull_skips_locally_deleted_records() {
        let mut storage = storage();
        storage.merge_remote(&remote_tag(1, "a")).unwrap();
        storage.delete_record(&remote_tag(1, "a")).unwrap();

        let transport = MockTransport::new();
        transport.set_snapshot(snapshot_of(vec![remote_tag(1, "a")]));
        let report = Reconciler::new(transport, SyncConfig::default())
            .pull(&mut storage)
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(storage.count(&TAG), 0);
        assert_eq!(storage.tombstones().len(), 1);
    }

    #[test]
    fn pull_applies_remote_deletions() {
        let mut storage = storage();
        storage.merge_remote(&remote_tag(1, "a")).unwrap();
        storage.merge_remote(&remote_tag(2, "b")).unwrap();
        storage.delete_record(&remote_tag(2, "b")).unwrap();

        let mut snapshot = BulkSnapshot::default();
        snapshot
            .deleted
            .insert("tag".into(), vec![RecordId::Remote(1), RecordId::Remote(2)]);
        let transport = MockTransport::new();
        transport.set_snapshot(snapshot);

        let report = Reconciler::new(transport, SyncConfig::default())
            .pull(&mut storage)
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(storage.count(&TAG), 0);
        // The remote side already agrees on tag 2.
        assert!(storage.tombstones().is_empty());
    }

    #[test]
    fn conflict_policies() {
        for (policy, expected) in [
            (ConflictPolicy::ServerWins, "remote"),
            (ConflictPolicy::ClientWins, "local"),
        ] {
            let mut storage = storage();
            storage.merge_remote(&remote_tag(1, "base")).unwrap();
            storage.save_record(remote_tag(1, "local")).unwrap();

            let transport = MockTransport::new();
            transport.set_snapshot(snapshot_of(vec![remote_tag(1, "remote")]));
            let config = SyncConfig::default().with_conflict_policy(policy);
            let report = Reconciler::new(transport, config).pull(&mut storage).unwrap();

            assert_eq!(report.conflicts, 1);
            let tag: Tag = storage.get(&Query::new().with("id", 1)).unwrap();
            assert_eq!(tag.label(), Some(expected));
            assert_eq!(
                storage.is_pending(&TAG, RecordId::Remote(1)),
                policy == ConflictPolicy::ClientWins
            );
        }
    }

    #[test]
    fn pull_rejects_records_without_remote_id() {
        let transport = MockTransport::new();
        transport.set_snapshot(snapshot_of(vec![Tag::new("x").into_record()]));
        let err = Reconciler::new(transport, SyncConfig::default())
            .pull(&mut storage())
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn push_reassigns_and_clears_markers() {
        let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
        let mut storage = ApplicationStorage::in_memory(config).unwrap();
        storage
            .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
            .unwrap();

        let reconciler = Reconciler::new(EchoTransport::starting_at(100), SyncConfig::default());
        let report = reconciler.push(&mut storage).unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(report.pushed, 2);
        assert_eq!(report.reassigned, 2);
        assert!(storage.pending().is_empty());

        let host: Host = storage.get(&Query::new().with("label", "web")).unwrap();
        assert!(host.id().unwrap().is_remote());
        let group: Group = storage.get(&Query::new().with("label", "prod")).unwrap();
        assert!(group.id().unwrap().is_remote());
        assert_eq!(host.reference("group"), group.id());
    }

    #[test]
    fn push_sends_unseen_related_records() {
        let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
        let mut storage = ApplicationStorage::in_memory(config).unwrap();
        storage
            .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
            .unwrap();
        // Only the host stays dirty.
        let group_key = storage
            .pending()
            .into_iter()
            .find(|k| k.set_name == "group")
            .unwrap();
        storage.clear_pending(&[group_key]);

        let transport = MockTransport::new();
        transport.set_ack(BulkAck::default());
        let reconciler = Reconciler::new(transport, SyncConfig::default());
        let report = reconciler.push(&mut storage).unwrap();
        assert_eq!(report.sent, 2);
        let upload = &reconciler.transport().uploads()[0];
        assert_eq!(upload.sets["group"].len(), 1);
        assert_eq!(upload.sets["host"].len(), 1);
    }

    #[test]
    fn unacknowledged_records_stay_dirty() {
        let mut storage = storage();
        let a = storage.save(Tag::new("a")).unwrap();
        storage.save(Tag::new("b")).unwrap();

        let transport = MockTransport::new();
        transport.set_ack(BulkAck {
            accepted: vec![IdAssignment {
                set_name: "tag".into(),
                sent: a.id().unwrap(),
                assigned: RecordId::Remote(5),
            }],
            ..BulkAck::default()
        });
        let report = Reconciler::new(transport, SyncConfig::default())
            .push(&mut storage)
            .unwrap();

        assert_eq!(report.pushed, 1);
        assert_eq!(report.rejected, 1);
        let pending = storage.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].id.is_local());
    }

    #[test]
    fn failed_push_keeps_local_state() {
        let mut storage = storage();
        storage.save(Tag::new("a")).unwrap();
        let transport = MockTransport::new();
        transport.set_connected(false);

        let err = Reconciler::new(transport, SyncConfig::default())
            .push(&mut storage)
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
        assert_eq!(storage.pending().len(), 1);
    }

    #[test]
    fn push_drops_only_confirmed_tombstones() {
        let mut storage = storage();
        for id in [1, 2] {
            storage.merge_remote(&remote_tag(id, "t")).unwrap();
            storage.delete_record(&remote_tag(id, "t")).unwrap();
        }
        let transport = MockTransport::new();
        let mut ack = BulkAck::default();
        ack.deleted.insert("tag".into(), vec![RecordId::Remote(1)]);
        transport.set_ack(ack);

        let reconciler = Reconciler::new(transport, SyncConfig::default());
        let report = reconciler.push(&mut storage).unwrap();
        assert_eq!(report.deletions_sent, 2);
        assert_eq!(report.deletions_confirmed, 1);
        let left = storage.tombstones();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, RecordId::Remote(2));

        let mut ack = BulkAck::default();
        ack.deleted.insert("tag".into(), vec![RecordId::Remote(2)]);
        reconciler.transport().set_ack(ack);
        let report = reconciler.push(&mut storage).unwrap();
        assert_eq!(report.deletions_sent, 1);
        assert_eq!(report.deletions_confirmed, 1);
        assert!(storage.tombstones().is_empty());

        // Nothing left to send.
        let report = reconciler.push(&mut storage).unwrap();
        assert_eq!(report.deletions_sent, 0);
        assert_eq!(reconciler.transport().uploads().len(), 2);
    }

    #[test]
    fn unconfirmed_deletion_is_not_resurrected_by_pull() {
        let mut storage = storage();
        for id in [1, 2] {
            storage.merge_remote(&remote_tag(id, "t")).unwrap();
            storage.delete_record(&remote_tag(id, "t")).unwrap();
        }
        let transport = MockTransport::new();
        let mut ack = BulkAck::default();
        ack.deleted.insert("tag".into(), vec![RecordId::Remote(1)]);
        transport.set_ack(ack);
        transport.set_snapshot(snapshot_of(vec![remote_tag(2, "t")]));

        let reconciler = Reconciler::new(transport, SyncConfig::default());
        reconciler.push(&mut storage).unwrap();
        let report = reconciler.pull(&mut storage).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(storage.count(&TAG), 0);
        assert_eq!(storage.tombstones().len(), 1);
    }

    #[test]
    fn full_clean_empties_every_set() {
        let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
        let mut storage = ApplicationStorage::in_memory(config).unwrap();
        storage
            .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
            .unwrap();
        storage.merge_remote(&remote_tag(9, "remote")).unwrap();

        let reconciler = Reconciler::new(EchoTransport::new(), SyncConfig::default());
        let report = reconciler.full_clean(&mut storage).unwrap();

        let order: Vec<_> = report.deleted.iter().map(|(set, _)| set.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "ssh_key",
                "ssh_identity",
                "snippet",
                "ssh_config",
                "tag",
                "group",
                "host",
                "pf_rule",
                "tag_host"
            ]
        );
        assert_eq!(report.total_deleted(), 3);
        assert!(storage.schemas().iter().all(|s| storage.count(s) == 0));
        assert_eq!(storage.count(&HOST), 0);
        // Only the remote-known tag needed a tombstone, and the echo
        // confirmed it.
        assert_eq!(report.pushed.deletions_sent, 1);
        assert_eq!(report.pushed.sent, 0);
        assert!(storage.tombstones().is_empty());
        assert!(storage.pending().is_empty());
    }

    #[test]
    fn failing_pull_aborts_full_clean() {
        let mut storage = ApplicationStorage::in_memory(
            StorageConfig::new().commit_policy(CommitPolicy::OnSuccess),
        )
        .unwrap();
        storage.session(|s| s.save(Tag::new("kept"))).unwrap();
        let transport = MockTransport::new();
        transport.set_connected(false);

        assert!(Reconciler::new(transport, SyncConfig::default())
            .full_clean(&mut storage)
            .is_err());
        assert_eq!(storage.count(&TAG), 1);
    }
}
