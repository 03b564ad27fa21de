//! Delete strategies.

use super::DeleteStrategy;
use crate::error::CoreResult;
use crate::record::Record;
use crate::schema::Cardinality;
use crate::store::{RecordKey, RecordStore, Tombstone};
use tracing::debug;

/// Removes records without keeping tombstones.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainDelete;

impl DeleteStrategy for PlainDelete {
    fn delete(&self, _record: &Record, _store: &mut RecordStore) -> CoreResult<()> {
        Ok(())
    }

    fn confirm_delete(
        &self,
        _confirmed: &[Tombstone],
        _store: &mut RecordStore,
    ) -> CoreResult<Vec<Tombstone>> {
        Ok(Vec::new())
    }
}

/// Keeps a tombstone for every deleted record the remote side knows about.
///
/// Records with a local id were never pushed, so deleting them leaves no
/// tombstone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncDelete;

impl DeleteStrategy for SyncDelete {
    fn delete(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()> {
        tombstone(record, store);
        Ok(())
    }

    fn confirm_delete(
        &self,
        confirmed: &[Tombstone],
        store: &mut RecordStore,
    ) -> CoreResult<Vec<Tombstone>> {
        Ok(confirm(confirmed, store))
    }
}

/// Like [`SyncDelete`], and deletes every record whose to-one foreign key
/// points at the deleted record. To-many keys only lose the id.
#[derive(Debug, Default, Clone, Copy)]
pub struct CascadeDelete;

impl DeleteStrategy for CascadeDelete {
    fn delete(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()> {
        tombstone(record, store);
        let Some(id) = record.id() else {
            return Ok(());
        };
        for (schema, raw) in store.dependents(record.schema(), id) {
            let owned = schema.relations_to(record.schema()).any(|relation| {
                relation.cardinality == Cardinality::One
                    && raw.get(relation.field).and_then(|v| v.as_id()) == Some(id)
            });
            let Some(dependent_id) = raw.id(schema.id_name) else {
                continue;
            };
            if owned && store.contains(schema, dependent_id) {
                store.remove(schema, dependent_id)?;
                debug!(set = schema.set_name, id = %dependent_id, "cascaded delete");
                self.delete(&Record::from_raw(schema, raw), store)?;
            }
        }
        for key in store.rewrite_references(record.schema(), id, None) {
            store.mark_pending(key);
        }
        Ok(())
    }

    fn confirm_delete(
        &self,
        confirmed: &[Tombstone],
        store: &mut RecordStore,
    ) -> CoreResult<Vec<Tombstone>> {
        Ok(confirm(confirmed, store))
    }
}

fn tombstone(record: &Record, store: &mut RecordStore) {
    if let Some(id) = record.id().filter(|id| id.is_remote()) {
        store.add_tombstone(RecordKey::new(record.set_name(), id));
    }
}

fn confirm(confirmed: &[Tombstone], store: &mut RecordStore) -> Vec<Tombstone> {
    let (done, remaining): (Vec<_>, Vec<_>) = store
        .tombstones()
        .into_iter()
        .partition(|stone| confirmed.contains(stone));
    if !done.is_empty() {
        store.set_tombstones(&remaining);
        debug!(confirmed = done.len(), remaining = remaining.len(), "tombstones confirmed");
    }
    remaining
}
