//! The application storage facade.

use crate::config::{CommitPolicy, GetStrategyKind, StorageConfig};
use crate::error::{CoreError, CoreResult};
use crate::id::{IdGenerator, UuidGenerator};
use crate::model::Model;
use crate::query::Query;
use crate::record::Record;
use crate::schema::SetSchema;
use crate::store::{RecordKey, RecordStore, Tombstone};
use crate::strategy::{self, DeleteStrategy, GetStrategy, SaveStrategy};
use sshconf_storage::{Driver, FileDriver, MemoryDriver, RecordId, RecordSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of merging a remote record into local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The record was new locally.
    Inserted,
    /// An existing local record was overwritten.
    Updated,
}

/// CRUD over typed record sets, backed by a driver.
///
/// All mutations are in memory until the storage is flushed, which
/// [`ApplicationStorage::session`] does on exit.
///
/// # Example
///
/// ```rust
/// use sshconf_core::{ApplicationStorage, Host, Query, StorageConfig};
///
/// let mut storage = ApplicationStorage::in_memory(StorageConfig::default()).unwrap();
/// let host = storage
///     .session(|s| s.save(Host::new("web", "10.0.0.1")))
///     .unwrap();
///
/// let found: Host = storage.get(&Query::new().with("label", "web")).unwrap();
/// assert_eq!(found.id(), host.id());
/// ```
pub struct ApplicationStorage {
    store: RecordStore,
    getter: Box<dyn GetStrategy>,
    saver: Box<dyn SaveStrategy>,
    deleter: Box<dyn DeleteStrategy>,
    commit_policy: CommitPolicy,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for ApplicationStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationStorage")
            .field("store", &self.store)
            .field("commit_policy", &self.commit_policy)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ApplicationStorage {
    /// Opens the file-backed storage described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the backing file exists but cannot
    /// be read or decoded, or [`CoreError::Config`] for an unusable
    /// configuration.
    pub fn open(config: StorageConfig) -> CoreResult<Self> {
        let path = config.storage_path()?;
        let driver = FileDriver::open(&path)?;
        info!(path = %path.display(), "opened storage");
        let mut storage = Self::with_driver(config, Box::new(driver))?;
        storage.path = Some(path);
        Ok(storage)
    }

    /// Creates a storage that never touches disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for an unusable configuration.
    pub fn in_memory(config: StorageConfig) -> CoreResult<Self> {
        Self::with_driver(config, Box::new(MemoryDriver::new()))
    }

    /// Creates a storage over an already loaded driver.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for an unusable configuration, or an
    /// invariant violation if the driver holds duplicate ids.
    pub fn with_driver(config: StorageConfig, driver: Box<dyn Driver>) -> CoreResult<Self> {
        Self::with_parts(config, driver, Box::new(UuidGenerator::new()))
    }

    /// Creates a storage with a custom id generator.
    ///
    /// # Errors
    ///
    /// Same as [`ApplicationStorage::with_driver`].
    pub fn with_parts(
        config: StorageConfig,
        driver: Box<dyn Driver>,
        ids: Box<dyn IdGenerator>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store: RecordStore::new(driver, ids, config.schemas)?,
            getter: strategy::get_strategy(config.get_strategy),
            saver: strategy::save_strategy(config.save_strategy),
            deleter: strategy::delete_strategy(config.delete_strategy),
            commit_policy: config.commit_policy,
            path: None,
        })
    }

    /// Replaces the get strategy.
    pub fn set_get_strategy(&mut self, getter: Box<dyn GetStrategy>) {
        self.getter = getter;
    }

    /// Replaces the save strategy.
    pub fn set_save_strategy(&mut self, saver: Box<dyn SaveStrategy>) {
        self.saver = saver;
    }

    /// Replaces the delete strategy.
    pub fn set_delete_strategy(&mut self, deleter: Box<dyn DeleteStrategy>) {
        self.deleter = deleter;
    }

    /// Returns the backing file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the commit policy.
    #[must_use]
    pub fn commit_policy(&self) -> CommitPolicy {
        self.commit_policy
    }

    /// Returns the registered schemas in deletion order.
    #[must_use]
    pub fn schemas(&self) -> &[&'static SetSchema] {
        self.store.schemas()
    }

    /// Looks up a registered schema by set name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the name is not registered.
    pub fn schema(&self, name: &str) -> CoreResult<&'static SetSchema> {
        self.store.schema(name)
    }

    /// Runs `body` as a scoped session and flushes the driver on exit.
    ///
    /// Under [`CommitPolicy::Always`] the flush happens even if `body`
    /// fails, so partial mutations persist. Under
    /// [`CommitPolicy::OnSuccess`] a failing body rolls the driver back to
    /// its last flushed state instead. Sessions may nest; every exit is a
    /// commit point.
    ///
    /// The body's error wins over a flush error that follows it.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the flush error if the body succeeded.
    pub fn session<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<CoreError>,
    {
        let outcome = body(self);
        let finish = match (&outcome, self.commit_policy) {
            (Err(_), CommitPolicy::OnSuccess) => {
                debug!("session failed, rolling back");
                self.rollback()
            }
            _ => self.commit(),
        };
        match (outcome, finish) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(finish_err)) => {
                warn!(error = %finish_err, "closing a failed session also failed");
                Err(err)
            }
        }
    }

    /// Flushes all in-memory mutations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the write fails.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.store.sync()
    }

    /// Discards mutations since the last flush.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if the durable state cannot be
    /// re-read.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.store.rollback()
    }

    // --- typed API ---

    /// Saves a model: creates it if it has no id, updates it otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnresolvedReference`] if an attached related
    /// model is unsaved and the save strategy does not persist related
    /// models.
    pub fn save<M: Model>(&mut self, model: M) -> CoreResult<M> {
        self.save_record(model.into_record()).map(M::from_record)
    }

    /// Creates a model that has no id yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if the model has an id.
    pub fn create<M: Model>(&mut self, model: M) -> CoreResult<M> {
        self.create_record(model.into_record()).map(M::from_record)
    }

    /// Updates an identified model in place.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if the model has no id.
    pub fn update<M: Model>(&mut self, model: M) -> CoreResult<M> {
        self.update_record(model.into_record()).map(M::from_record)
    }

    /// Deletes a model and registers its deletion with the delete strategy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the model's id is absent from its
    /// set, or [`CoreError::InvariantViolation`] if it has no id.
    pub fn delete<M: Model>(&mut self, model: &M) -> CoreResult<()> {
        self.delete_record(model.record())
    }

    /// Returns the single model matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for zero matches and
    /// [`CoreError::AmbiguousMatch`] for more than one.
    pub fn get<M: Model>(&self, query: &Query) -> CoreResult<M> {
        self.get_record(M::schema(), query).map(M::from_record)
    }

    /// Returns every model matching `query`, in set order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for a malformed query.
    pub fn filter<M: Model>(&self, query: &Query) -> CoreResult<Vec<M>> {
        Ok(self
            .filter_records(M::schema(), query)?
            .into_iter()
            .map(M::from_record)
            .collect())
    }

    /// Returns every model of a type, in set order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the type's set is not
    /// registered.
    pub fn get_all<M: Model>(&self) -> CoreResult<Vec<M>> {
        Ok(self
            .all_records(M::schema())?
            .into_iter()
            .map(M::from_record)
            .collect())
    }

    // --- record API ---

    /// Untyped [`ApplicationStorage::save`].
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::save`].
    pub fn save_record(&mut self, record: Record) -> CoreResult<Record> {
        let record = self.saver.save(record, &mut self.store)?;
        if record.id().is_some() {
            self.update_record(record)
        } else {
            self.create_record(record)
        }
    }

    /// Untyped [`ApplicationStorage::create`].
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::create`].
    pub fn create_record(&mut self, record: Record) -> CoreResult<Record> {
        let record = self.store.create(record)?;
        self.saver.mark(&record, &mut self.store)?;
        Ok(record)
    }

    /// Untyped [`ApplicationStorage::update`].
    ///
    /// An id absent from the set is appended, so a retried update is
    /// harmless.
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::update`].
    pub fn update_record(&mut self, record: Record) -> CoreResult<Record> {
        if !self.store.update(&record)? {
            debug!(set = record.set_name(), "update of unknown id appended");
        }
        self.saver.mark(&record, &mut self.store)?;
        Ok(record)
    }

    /// Untyped [`ApplicationStorage::delete`].
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::delete`].
    pub fn delete_record(&mut self, record: &Record) -> CoreResult<()> {
        let id = record.id().ok_or_else(|| {
            CoreError::invariant(format!(
                "cannot delete {} record without an id",
                record.set_name()
            ))
        })?;
        let raw = self.store.remove(record.schema(), id)?;
        self.deleter
            .delete(&Record::from_raw(record.schema(), raw), &mut self.store)
    }

    /// Untyped [`ApplicationStorage::get`].
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::get`].
    pub fn get_record(&self, schema: &'static SetSchema, query: &Query) -> CoreResult<Record> {
        let mut found = self.filter_records(schema, query)?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(CoreError::not_found(schema.set_name, query.to_string())),
            count => Err(CoreError::AmbiguousMatch {
                set_name: schema.set_name.to_string(),
                lookup: query.to_string(),
                count,
            }),
        }
    }

    /// Untyped [`ApplicationStorage::filter`].
    ///
    /// # Errors
    ///
    /// See [`ApplicationStorage::filter`].
    pub fn filter_records(
        &self,
        schema: &'static SetSchema,
        query: &Query,
    ) -> CoreResult<Vec<Record>> {
        query.validate()?;
        Ok(self
            .all_records(schema)?
            .into_iter()
            .filter(|record| query.matches(record))
            .collect())
    }

    /// Every record of a set, resolved by the bound get strategy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the set is not registered.
    pub fn all_records(&self, schema: &'static SetSchema) -> CoreResult<Vec<Record>> {
        self.all_records_with(schema, self.getter.as_ref())
    }

    /// Every record of a set, resolved by `getter` instead of the bound
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the set is not registered.
    pub fn all_records_with(
        &self,
        schema: &'static SetSchema,
        getter: &dyn GetStrategy,
    ) -> CoreResult<Vec<Record>> {
        self.store.schema(schema.set_name)?;
        self.store
            .records(schema)
            .iter()
            .map(|raw| getter.get(Record::from_raw(schema, raw.clone()), &self.store))
            .collect()
    }

    /// Every record of a set as stored, without resolution.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the set is not registered.
    pub fn raw_records(&self, schema: &'static SetSchema) -> CoreResult<Vec<Record>> {
        self.all_records_with(schema, &strategy::InternalGet)
    }

    /// Looks up one record by id, resolved with `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the set is not registered.
    pub fn find_record(
        &self,
        schema: &'static SetSchema,
        id: RecordId,
        kind: GetStrategyKind,
    ) -> CoreResult<Option<Record>> {
        self.store.schema(schema.set_name)?;
        let Some(raw) = self.store.find(schema, id) else {
            return Ok(None);
        };
        strategy::get_strategy(kind)
            .get(Record::from_raw(schema, raw.clone()), &self.store)
            .map(Some)
    }

    /// Returns true if the set holds a record with the given id.
    #[must_use]
    pub fn contains(&self, schema: &SetSchema, id: RecordId) -> bool {
        self.store.contains(schema, id)
    }

    /// Returns the number of records in a set.
    #[must_use]
    pub fn count(&self, schema: &SetSchema) -> usize {
        self.store.records(schema).len()
    }

    // --- low level ---

    /// Returns a driver entry as stored.
    #[must_use]
    pub fn low_get(&self, key: &str) -> Option<&RecordSet> {
        self.store.low_get(key)
    }

    /// Replaces a driver entry.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if a registered set would hold
    /// duplicate ids.
    pub fn low_set(&mut self, key: &str, value: RecordSet) -> CoreResult<()> {
        self.store.low_set(key, value)
    }

    /// Returns every driver key, bookkeeping entries included.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Generates an id unused in a set.
    pub fn generate_id(&mut self, schema: &'static SetSchema) -> RecordId {
        self.store.generate_id(schema)
    }

    // --- sync support ---

    /// Records marked for the next push, in marking order.
    #[must_use]
    pub fn pending(&self) -> Vec<RecordKey> {
        self.store.pending()
    }

    /// Returns true if a record is marked for the next push.
    #[must_use]
    pub fn is_pending(&self, schema: &SetSchema, id: RecordId) -> bool {
        self.store.is_pending(schema.set_name, id)
    }

    /// Removes pending markers.
    pub fn clear_pending(&mut self, keys: &[RecordKey]) {
        for key in keys {
            self.store.unmark_pending(key);
        }
    }

    /// Retained tombstones, oldest first.
    #[must_use]
    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.store.tombstones()
    }

    /// Returns true if a tombstone exists for the record.
    #[must_use]
    pub fn is_tombstoned(&self, schema: &SetSchema, id: RecordId) -> bool {
        self.store
            .tombstones()
            .iter()
            .any(|t| t.set_name == schema.set_name && t.id == id)
    }

    /// Drops the given tombstones without consulting the delete strategy.
    pub fn forget_tombstones(&mut self, sent: &[Tombstone]) {
        let remaining: Vec<_> = self
            .store
            .tombstones()
            .into_iter()
            .filter(|t| !sent.contains(t))
            .collect();
        self.store.set_tombstones(&remaining);
    }

    /// Removes tombstones confirmed by the remote side and returns the
    /// ones still to be sent.
    ///
    /// # Errors
    ///
    /// Propagates delete strategy failures.
    pub fn confirm_delete(&mut self, confirmed: &[Tombstone]) -> CoreResult<Vec<Tombstone>> {
        self.deleter.confirm_delete(confirmed, &mut self.store)
    }

    /// Writes a record received from the remote side, bypassing the save
    /// strategy. The record must carry an id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if the record has no id.
    pub fn merge_remote(&mut self, record: &Record) -> CoreResult<Merge> {
        if self.store.update(record)? {
            Ok(Merge::Updated)
        } else {
            Ok(Merge::Inserted)
        }
    }

    /// Removes a record the remote side deleted, without a tombstone.
    /// Returns false if it was not present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSet`] if the set is not registered.
    pub fn remove_remote(&mut self, schema: &'static SetSchema, id: RecordId) -> CoreResult<bool> {
        self.store.schema(schema.set_name)?;
        if !self.store.contains(schema, id) {
            return Ok(false);
        }
        self.store.remove(schema, id)?;
        Ok(true)
    }

    /// Re-keys a record, rewriting every reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if `from` is absent, or an invariant
    /// violation if `to` is taken.
    pub fn reassign_id(
        &mut self,
        schema: &'static SetSchema,
        from: RecordId,
        to: RecordId,
    ) -> CoreResult<()> {
        self.store.reassign_id(schema, from, to)
    }

    /// The remote cursor stored by the last pull or push.
    #[must_use]
    pub fn sync_cursor(&self) -> Option<String> {
        self.store.sync_cursor()
    }

    /// Stores the remote cursor.
    pub fn set_sync_cursor(&mut self, cursor: Option<&str>) {
        self.store.set_sync_cursor(cursor);
    }
}
