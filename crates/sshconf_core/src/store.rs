//! Indexed record sets over a driver.
//!
//! The store owns the driver and keeps a per-set `id -> slot` index so that
//! lookups and updates do not scan the set. It also owns the bookkeeping
//! sets used by the sync strategies:
//!
//! | key | contents |
//! |---|---|
//! | `__pending` | `{set, id}` for records to include in the next push |
//! | `__deleted` | `{set, id}` tombstones awaiting remote confirmation |
//! | `__sync` | a single `{last_synced}` record |

use crate::error::{CoreError, CoreResult};
use crate::id::IdGenerator;
use crate::record::Record;
use crate::schema::{Cardinality, SetSchema};
use sshconf_storage::{Driver, RawRecord, RecordId, RecordSet, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const PENDING_KEY: &str = "__pending";
const DELETED_KEY: &str = "__deleted";
const SYNC_KEY: &str = "__sync";

/// Identifies one record across sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Set holding the record.
    pub set_name: String,
    /// Record identifier.
    pub id: RecordId,
}

impl RecordKey {
    /// Creates a key.
    pub fn new(set_name: impl Into<String>, id: RecordId) -> Self {
        Self {
            set_name: set_name.into(),
            id,
        }
    }

    fn to_raw(&self) -> RawRecord {
        [
            ("set", Value::from(self.set_name.as_str())),
            ("id", Value::from(self.id)),
        ]
        .into_iter()
        .collect()
    }

    fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self::new(raw.get("set")?.as_text()?, raw.get("id")?.as_id()?))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.set_name, self.id)
    }
}

/// A retained `(set, id)` pair marking a local deletion pending remote
/// confirmation.
pub type Tombstone = RecordKey;

/// Record sets with id indexes and sync bookkeeping.
pub struct RecordStore {
    driver: Box<dyn Driver>,
    ids: Box<dyn IdGenerator>,
    schemas: Vec<&'static SetSchema>,
    indexes: HashMap<&'static str, HashMap<RecordId, usize>>,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.schemas.iter().map(|s| s.set_name).collect();
        f.debug_struct("RecordStore")
            .field("schemas", &names)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Wraps a loaded driver.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if a registered set already holds two
    /// records with the same id.
    pub fn new(
        driver: Box<dyn Driver>,
        ids: Box<dyn IdGenerator>,
        schemas: Vec<&'static SetSchema>,
    ) -> CoreResult<Self> {
        let mut store = Self {
            driver,
            ids,
            schemas,
            indexes: HashMap::new(),
        };
        store.reindex_all()?;
        Ok(store)
    }

    /// Returns the registered schemas in deletion order.
    #[must_use]
    pub fn schemas(&self) -> &[&'static SetSchema] {
        &self.schemas
    }

    /// Looks up a registered schema by set name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if no schema is registered under
    /// `name`.
    pub fn schema(&self, name: &str) -> CoreResult<&'static SetSchema> {
        self.schemas
            .iter()
            .copied()
            .find(|s| s.set_name == name)
            .ok_or_else(|| CoreError::UnknownSet {
                name: name.to_string(),
            })
    }

    fn check_registered(&self, schema: &SetSchema) -> CoreResult<()> {
        self.schema(schema.set_name).map(|_| ())
    }

    /// Returns the records of a set in insertion order.
    #[must_use]
    pub fn records(&self, schema: &SetSchema) -> &[RawRecord] {
        self.driver
            .get(schema.set_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the record with the given id.
    #[must_use]
    pub fn find(&self, schema: &SetSchema, id: RecordId) -> Option<&RawRecord> {
        let slot = *self.indexes.get(schema.set_name)?.get(&id)?;
        self.records(schema).get(slot)
    }

    /// Returns true if the set holds a record with the given id.
    #[must_use]
    pub fn contains(&self, schema: &SetSchema, id: RecordId) -> bool {
        self.indexes
            .get(schema.set_name)
            .is_some_and(|index| index.contains_key(&id))
    }

    /// Generates an id unused in the record's set.
    pub fn generate_id(&mut self, schema: &'static SetSchema) -> RecordId {
        let index = self.indexes.get(schema.set_name);
        let is_taken = |id: RecordId| index.is_some_and(|index| index.contains_key(&id));
        self.ids.generate(schema, &is_taken)
    }

    /// Assigns a fresh id to an unidentified record and appends it.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the record already has an id, or
    /// [`CoreError::UnknownSet`] if its set is not registered.
    pub fn create(&mut self, mut record: Record) -> CoreResult<Record> {
        if let Some(id) = record.id() {
            return Err(CoreError::invariant(format!(
                "cannot create {} record that already has id {id}",
                record.set_name()
            )));
        }
        let id = self.generate_id(record.schema());
        record.set_id(id);
        self.insert(record.schema(), record.raw().clone())?;
        debug!(set = record.set_name(), %id, "record created");
        Ok(record)
    }

    /// Replaces an identified record in place, or appends it if the id is
    /// not present. Returns true if an existing record was replaced.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the record has no id, or
    /// [`CoreError::UnknownSet`] if its set is not registered.
    pub fn update(&mut self, record: &Record) -> CoreResult<bool> {
        let id = record.id().ok_or_else(|| {
            CoreError::invariant(format!(
                "cannot update {} record without an id",
                record.set_name()
            ))
        })?;
        self.upsert(record.schema(), id, record.raw().clone())
    }

    /// Appends a raw record whose id must be new to the set.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the record has no id or the id is
    /// already present.
    pub fn insert(&mut self, schema: &'static SetSchema, raw: RawRecord) -> CoreResult<()> {
        self.check_registered(schema)?;
        let id = raw.id(schema.id_name).ok_or_else(|| {
            CoreError::invariant(format!("{} record has no id", schema.set_name))
        })?;
        if self.contains(schema, id) {
            return Err(CoreError::invariant(format!(
                "{} already holds a record with id {id}",
                schema.set_name
            )));
        }
        let set = self.driver.setdefault(schema.set_name, RecordSet::new());
        set.push(raw);
        let slot = set.len() - 1;
        self.indexes
            .entry(schema.set_name)
            .or_default()
            .insert(id, slot);
        Ok(())
    }

    /// Overwrites the slot holding `id`, or appends.
    ///
    /// The slot is replaced in place, so the set never holds two records
    /// with the same id.
    pub(crate) fn upsert(
        &mut self,
        schema: &'static SetSchema,
        id: RecordId,
        raw: RawRecord,
    ) -> CoreResult<bool> {
        self.check_registered(schema)?;
        let slot = self
            .indexes
            .get(schema.set_name)
            .and_then(|index| index.get(&id))
            .copied();
        if let Some(slot) = slot {
            if let Some(existing) = self
                .driver
                .get_mut(schema.set_name)
                .and_then(|set| set.get_mut(slot))
            {
                *existing = raw;
                return Ok(true);
            }
        }
        self.insert(schema, raw)?;
        Ok(false)
    }

    /// Removes the record with the given id, preserving the order of the
    /// rest. Its pending marker goes with it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the id is absent from the set.
    pub fn remove(&mut self, schema: &'static SetSchema, id: RecordId) -> CoreResult<RawRecord> {
        self.check_registered(schema)?;
        let slot = self
            .indexes
            .get(schema.set_name)
            .and_then(|index| index.get(&id))
            .copied()
            .ok_or_else(|| CoreError::id_not_found(schema.set_name, id))?;
        let set = self
            .driver
            .get_mut(schema.set_name)
            .ok_or_else(|| CoreError::id_not_found(schema.set_name, id))?;
        let raw = set.remove(slot);
        if let Some(index) = self.indexes.get_mut(schema.set_name) {
            index.remove(&id);
            for other in index.values_mut() {
                if *other > slot {
                    *other -= 1;
                }
            }
        }
        self.unmark_pending(&RecordKey::new(schema.set_name, id));
        debug!(set = schema.set_name, %id, "record removed");
        Ok(raw)
    }

    /// Returns every registered record whose foreign keys point at `id`.
    #[must_use]
    pub fn dependents(
        &self,
        target: &SetSchema,
        id: RecordId,
    ) -> Vec<(&'static SetSchema, RawRecord)> {
        let mut found = Vec::new();
        for schema in &self.schemas {
            let relations: Vec<_> = schema.relations_to(target).collect();
            if relations.is_empty() {
                continue;
            }
            for raw in self.records(schema) {
                let hit = relations.iter().any(|relation| {
                    let value = raw.get(relation.field);
                    match relation.cardinality {
                        Cardinality::One => value.and_then(Value::as_id) == Some(id),
                        Cardinality::Many => value
                            .and_then(Value::as_list)
                            .is_some_and(|ids| ids.iter().any(|v| v.as_id() == Some(id))),
                    }
                });
                if hit {
                    found.push((*schema, raw.clone()));
                }
            }
        }
        found
    }

    /// Rewrites every foreign key pointing at `from` in `target` to `to`.
    /// A `None` replacement drops the reference. Returns the keys of the
    /// records that changed.
    pub fn rewrite_references(
        &mut self,
        target: &SetSchema,
        from: RecordId,
        to: Option<RecordId>,
    ) -> Vec<RecordKey> {
        let mut changed = Vec::new();
        for schema in self.schemas.clone() {
            let relations: Vec<_> = schema.relations_to(target).collect();
            if relations.is_empty() {
                continue;
            }
            let Some(set) = self.driver.get_mut(schema.set_name) else {
                continue;
            };
            for raw in set.iter_mut() {
                let mut touched = false;
                for relation in &relations {
                    let Some(value) = raw.get_mut(relation.field) else {
                        continue;
                    };
                    touched |= rewrite_value(value, from, to, relation.cardinality);
                }
                if touched {
                    if let Some(id) = raw.id(schema.id_name) {
                        changed.push(RecordKey::new(schema.set_name, id));
                    }
                }
            }
        }
        changed
    }

    /// Changes a record's id, rewriting foreign keys, pending markers and
    /// tombstones that refer to it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `from` is absent, or an invariant
    /// violation if `to` is already taken.
    pub fn reassign_id(
        &mut self,
        schema: &'static SetSchema,
        from: RecordId,
        to: RecordId,
    ) -> CoreResult<()> {
        if from == to {
            return Ok(());
        }
        self.check_registered(schema)?;
        if self.contains(schema, to) {
            return Err(CoreError::invariant(format!(
                "cannot move {} record {from} to {to}: id taken",
                schema.set_name
            )));
        }
        let slot = self
            .indexes
            .get(schema.set_name)
            .and_then(|index| index.get(&from))
            .copied()
            .ok_or_else(|| CoreError::id_not_found(schema.set_name, from))?;
        if let Some(raw) = self
            .driver
            .get_mut(schema.set_name)
            .and_then(|set| set.get_mut(slot))
        {
            raw.insert(schema.id_name, to);
        }
        if let Some(index) = self.indexes.get_mut(schema.set_name) {
            index.remove(&from);
            index.insert(to, slot);
        }
        self.rewrite_references(schema, from, Some(to));
        let old = RecordKey::new(schema.set_name, from);
        self.rekey(PENDING_KEY, &old, to);
        self.rekey(DELETED_KEY, &old, to);
        debug!(set = schema.set_name, %from, %to, "record id reassigned");
        Ok(())
    }

    // --- bookkeeping sets ---

    fn keys_in(&self, key: &str) -> Vec<RecordKey> {
        self.driver
            .get(key)
            .map(|set| set.iter().filter_map(RecordKey::from_raw).collect())
            .unwrap_or_default()
    }

    fn store_keys(&mut self, key: &str, keys: &[RecordKey]) {
        self.driver
            .set(key, keys.iter().map(RecordKey::to_raw).collect());
    }

    fn rekey(&mut self, key: &str, old: &RecordKey, id: RecordId) {
        let mut keys = self.keys_in(key);
        if let Some(found) = keys.iter_mut().find(|k| *k == old) {
            found.id = id;
            self.store_keys(key, &keys);
        }
    }

    /// Returns the records marked for the next push, in marking order.
    #[must_use]
    pub fn pending(&self) -> Vec<RecordKey> {
        self.keys_in(PENDING_KEY)
    }

    /// Returns true if the record is marked for the next push.
    #[must_use]
    pub fn is_pending(&self, set_name: &str, id: RecordId) -> bool {
        self.driver.get(PENDING_KEY).is_some_and(|set| {
            set.iter()
                .filter_map(RecordKey::from_raw)
                .any(|k| k.set_name == set_name && k.id == id)
        })
    }

    /// Marks a record for the next push. Marking twice is a no-op.
    pub fn mark_pending(&mut self, key: RecordKey) {
        if self.is_pending(&key.set_name, key.id) {
            return;
        }
        self.driver
            .setdefault(PENDING_KEY, RecordSet::new())
            .push(key.to_raw());
    }

    /// Removes a pending marker.
    pub fn unmark_pending(&mut self, key: &RecordKey) {
        if !self.is_pending(&key.set_name, key.id) {
            return;
        }
        let keys: Vec<_> = self.pending().into_iter().filter(|k| k != key).collect();
        self.store_keys(PENDING_KEY, &keys);
    }

    /// Returns the retained tombstones, oldest first.
    #[must_use]
    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.keys_in(DELETED_KEY)
    }

    /// Appends a tombstone. Adding one twice is a no-op.
    pub fn add_tombstone(&mut self, tombstone: Tombstone) {
        let mut tombstones = self.tombstones();
        if tombstones.contains(&tombstone) {
            return;
        }
        tombstones.push(tombstone);
        self.store_keys(DELETED_KEY, &tombstones);
    }

    /// Replaces the tombstone log.
    pub fn set_tombstones(&mut self, tombstones: &[Tombstone]) {
        self.store_keys(DELETED_KEY, tombstones);
    }

    /// Returns the stored sync cursor.
    #[must_use]
    pub fn sync_cursor(&self) -> Option<String> {
        self.driver
            .get(SYNC_KEY)?
            .first()?
            .get("last_synced")?
            .as_text()
            .map(str::to_owned)
    }

    /// Stores the sync cursor.
    pub fn set_sync_cursor(&mut self, cursor: Option<&str>) {
        let raw: RawRecord = [("last_synced", Value::from(cursor))].into_iter().collect();
        self.driver.set(SYNC_KEY, vec![raw]);
    }

    // --- raw driver access ---

    /// Returns a driver entry as stored.
    #[must_use]
    pub fn low_get(&self, key: &str) -> Option<&RecordSet> {
        self.driver.get(key)
    }

    /// Replaces a driver entry and reindexes it.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if a registered set would hold two
    /// records with the same id.
    pub fn low_set(&mut self, key: &str, value: RecordSet) -> CoreResult<()> {
        let Ok(schema) = self.schema(key) else {
            self.driver.set(key, value);
            return Ok(());
        };
        let index = build_index(schema, &value)?;
        self.driver.set(key, value);
        self.indexes.insert(schema.set_name, index);
        Ok(())
    }

    /// Returns every driver key.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.driver.keys()
    }

    /// Flushes the driver.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the write fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.driver.sync()?;
        Ok(())
    }

    /// Discards mutations since the last flush.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the durable state cannot be
    /// re-read.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.driver.rollback()?;
        self.reindex_all()
    }

    fn reindex_all(&mut self) -> CoreResult<()> {
        self.indexes.clear();
        for schema in self.schemas.clone() {
            self.reindex(schema)?;
        }
        Ok(())
    }

    fn reindex(&mut self, schema: &'static SetSchema) -> CoreResult<()> {
        let index = build_index(schema, self.records(schema))?;
        self.indexes.insert(schema.set_name, index);
        Ok(())
    }
}

fn build_index(
    schema: &SetSchema,
    records: &[RawRecord],
) -> CoreResult<HashMap<RecordId, usize>> {
    let mut index = HashMap::new();
    for (slot, raw) in records.iter().enumerate() {
        let Some(id) = raw.id(schema.id_name) else {
            continue;
        };
        if index.insert(id, slot).is_some() {
            return Err(CoreError::invariant(format!(
                "{} holds id {id} more than once",
                schema.set_name
            )));
        }
    }
    Ok(index)
}

fn rewrite_value(
    value: &mut Value,
    from: RecordId,
    to: Option<RecordId>,
    cardinality: Cardinality,
) -> bool {
    match cardinality {
        Cardinality::One if value.as_id() == Some(from) => {
            *value = Value::from(to);
            true
        }
        Cardinality::Many => {
            let Value::List(items) = value else {
                return false;
            };
            let mut touched = false;
            items.retain_mut(|item| {
                if item.as_id() != Some(from) {
                    return true;
                }
                touched = true;
                match to {
                    Some(to) => {
                        *item = Value::Id(to);
                        true
                    }
                    None => false,
                }
            });
            touched
        }
        Cardinality::One => false,
    }
}
