//! Get strategies.

use super::GetStrategy;
use crate::error::CoreResult;
use crate::record::{Related, Record};
use crate::schema::{Cardinality, SetSchema};
use crate::store::RecordStore;
use sshconf_storage::RecordId;

/// Wraps raw fields only.
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalGet;

impl GetStrategy for InternalGet {
    fn get(&self, record: Record, _store: &RecordStore) -> CoreResult<Record> {
        Ok(record)
    }
}

/// Follows foreign keys and attaches the referenced records.
///
/// Resolution is recursive up to `max_depth` levels (unbounded by default).
/// A record already being resolved higher up the chain is attached without
/// its own relations, which keeps self-referencing sets such as nested
/// groups finite. Dangling keys resolve to `Related::One(None)` or are left
/// out of `Related::Many`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelatedGet {
    max_depth: Option<usize>,
}

impl RelatedGet {
    /// Resolves the full graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves at most `depth` levels.
    #[must_use]
    pub fn with_max_depth(depth: usize) -> Self {
        Self {
            max_depth: Some(depth),
        }
    }

    fn resolve(
        &self,
        mut record: Record,
        store: &RecordStore,
        remaining: Option<usize>,
        chain: &mut Vec<(&'static str, RecordId)>,
    ) -> Record {
        if remaining == Some(0) {
            return record;
        }
        let next = remaining.map(|depth| depth - 1);
        let own = record.id().map(|id| (record.set_name(), id));
        if let Some(own) = own {
            chain.push(own);
        }
        for relation in record.schema().relations {
            let related = match relation.cardinality {
                Cardinality::One => Related::One(
                    record
                        .reference(relation.field)
                        .and_then(|id| self.load(relation.target, id, store, next, chain))
                        .map(Box::new),
                ),
                Cardinality::Many => Related::Many(
                    record
                        .references(relation.field)
                        .into_iter()
                        .filter_map(|id| self.load(relation.target, id, store, next, chain))
                        .collect(),
                ),
            };
            record.put_related(relation.field, related);
        }
        if own.is_some() {
            chain.pop();
        }
        record
    }

    fn load(
        &self,
        schema: &'static SetSchema,
        id: RecordId,
        store: &RecordStore,
        remaining: Option<usize>,
        chain: &mut Vec<(&'static str, RecordId)>,
    ) -> Option<Record> {
        let record = Record::from_raw(schema, store.find(schema, id)?.clone());
        if chain.contains(&(schema.set_name, id)) {
            return Some(record);
        }
        Some(self.resolve(record, store, remaining, chain))
    }
}

impl GetStrategy for RelatedGet {
    fn get(&self, record: Record, store: &RecordStore) -> CoreResult<Record> {
        Ok(self.resolve(record, store, self.max_depth, &mut Vec::new()))
    }
}
