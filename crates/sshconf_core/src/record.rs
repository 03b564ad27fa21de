//! Schema-bound records.

use crate::error::{CoreError, CoreResult};
use crate::schema::{Cardinality, SetSchema};
use sshconf_storage::{RawRecord, RecordId, Value};
use std::collections::BTreeMap;

/// A resolved foreign-key reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// To-one reference. `None` when the key is null or dangling.
    One(Option<Box<Record>>),
    /// To-many reference. Dangling ids are left out.
    Many(Vec<Record>),
}

/// A raw record bound to its schema, plus any resolved related records.
///
/// Raw fields hold foreign keys as ids. Resolution by a get strategy only
/// fills the related map, so a resolved record writes back exactly the raw
/// fields it was read with.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: &'static SetSchema,
    fields: RawRecord,
    related: BTreeMap<&'static str, Related>,
}

impl Record {
    /// Creates an empty, unsaved record.
    #[must_use]
    pub fn new(schema: &'static SetSchema) -> Self {
        Self::from_raw(schema, RawRecord::new())
    }

    /// Wraps raw fields read from the driver.
    #[must_use]
    pub fn from_raw(schema: &'static SetSchema, fields: RawRecord) -> Self {
        Self {
            schema,
            fields,
            related: BTreeMap::new(),
        }
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &'static SetSchema {
        self.schema
    }

    /// Returns the set name.
    #[must_use]
    pub fn set_name(&self) -> &'static str {
        self.schema.set_name
    }

    /// Returns the identifier, or `None` if the record was never persisted.
    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.fields.id(self.schema.id_name)
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: RecordId) {
        self.fields.insert(self.schema.id_name, id);
    }

    /// Removes the identifier.
    pub fn clear_id(&mut self) {
        self.fields.remove(self.schema.id_name);
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field, value);
    }

    /// Builder form of [`Record::set`].
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns a text field.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_text)
    }

    /// Returns an integer field.
    #[must_use]
    pub fn integer(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_integer)
    }

    /// Returns a boolean field.
    #[must_use]
    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Returns the id held by a to-one foreign key.
    #[must_use]
    pub fn reference(&self, field: &str) -> Option<RecordId> {
        self.get(field).and_then(Value::as_id)
    }

    /// Returns the ids held by a to-many foreign key.
    #[must_use]
    pub fn references(&self, field: &str) -> Vec<RecordId> {
        self.get(field)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_id).collect())
            .unwrap_or_default()
    }

    /// Returns the resolved record behind a to-one foreign key.
    #[must_use]
    pub fn related(&self, field: &str) -> Option<&Record> {
        match self.related.get(field) {
            Some(Related::One(Some(record))) => Some(record),
            _ => None,
        }
    }

    /// Returns the resolved records behind a to-many foreign key.
    #[must_use]
    pub fn related_many(&self, field: &str) -> &[Record] {
        match self.related.get(field) {
            Some(Related::Many(records)) => records,
            _ => &[],
        }
    }

    /// Returns the resolution state of a foreign key.
    #[must_use]
    pub fn related_entry(&self, field: &str) -> Option<&Related> {
        self.related.get(field)
    }

    /// Returns true if any foreign key has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.related.is_empty()
    }

    /// Attaches a related record to a to-one foreign key.
    ///
    /// The key is set to the related record's id, or null if it has none
    /// yet.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `field` is not a to-one relation
    /// of this schema, or `related` belongs to another set than declared.
    pub fn set_related(&mut self, field: &str, related: Record) -> CoreResult<()> {
        let relation = self.checked_relation(field, Cardinality::One, &related)?;
        self.attach_one(relation.field, related);
        Ok(())
    }

    /// Attaches a related record to a declared to-one key without checks.
    pub(crate) fn attach_one(&mut self, field: &'static str, related: Record) {
        self.fields.insert(field, related.id());
        self.related
            .insert(field, Related::One(Some(Box::new(related))));
    }

    /// Appends a related record to a to-many foreign key.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if `field` is not a to-many relation
    /// of this schema, or `related` belongs to another set than declared.
    pub fn push_related(&mut self, field: &str, related: Record) -> CoreResult<()> {
        let relation = self.checked_relation(field, Cardinality::Many, &related)?;
        let mut ids = self.references(relation.field);
        if let Some(id) = related.id() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.fields.insert(relation.field, ids);
        match self
            .related
            .entry(relation.field)
            .or_insert_with(|| Related::Many(Vec::new()))
        {
            Related::Many(records) => records.push(related),
            other => *other = Related::Many(vec![related]),
        }
        Ok(())
    }

    /// Stores a resolution result produced by a get strategy.
    pub(crate) fn put_related(&mut self, field: &'static str, related: Related) {
        self.related.insert(field, related);
    }

    /// Detaches all resolved related records.
    pub fn take_related(&mut self) -> BTreeMap<&'static str, Related> {
        std::mem::take(&mut self.related)
    }

    /// Returns the raw fields.
    #[must_use]
    pub fn raw(&self) -> &RawRecord {
        &self.fields
    }

    /// Returns the raw fields mutably.
    pub fn raw_mut(&mut self) -> &mut RawRecord {
        &mut self.fields
    }

    /// Consumes the record, returning its raw fields.
    #[must_use]
    pub fn into_raw(self) -> RawRecord {
        self.fields
    }

    /// Follows a dotted field path through resolved related records.
    ///
    /// `["group", "label"]` reads `label` of the record resolved behind the
    /// `group` key. Paths through unresolved or to-many keys yield `None`.
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        match path {
            [] => None,
            [field] => self.get(field.as_ref()),
            [field, rest @ ..] => self.related(field.as_ref())?.lookup(rest),
        }
    }

    fn checked_relation(
        &self,
        field: &str,
        cardinality: Cardinality,
        related: &Record,
    ) -> CoreResult<&'static crate::schema::Relation> {
        let relation = self
            .schema
            .relation(field)
            .filter(|r| r.cardinality == cardinality)
            .ok_or_else(|| {
                CoreError::invariant(format!(
                    "{}.{field} is not a {cardinality:?} relation",
                    self.schema.set_name
                ))
            })?;
        if relation.target != related.schema {
            return Err(CoreError::invariant(format!(
                "{}.{field} expects a {} record, got {}",
                self.schema.set_name,
                relation.target.set_name,
                related.set_name()
            )));
        }
        Ok(relation)
    }
}
