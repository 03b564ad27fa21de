//! Identifier generation for newly created records.

use crate::schema::SetSchema;
use sshconf_storage::RecordId;
use uuid::Uuid;

/// Assigns identifiers to records created locally.
///
/// Generated ids must be unique within the record's set and must never
/// reuse an id still held by a live record. They must also be
/// distinguishable from remote ids, which is what lets the sync strategies
/// tell a never-synced record from a synced one.
pub trait IdGenerator: Send {
    /// Returns a fresh id for a record of `schema`.
    ///
    /// `is_taken` reports whether an id is already present in the set.
    fn generate(&mut self, schema: &SetSchema, is_taken: &dyn Fn(RecordId) -> bool) -> RecordId;
}

/// Generates random v4 UUIDs in the local id space.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl UuidGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidGenerator {
    fn generate(&mut self, _schema: &SetSchema, is_taken: &dyn Fn(RecordId) -> bool) -> RecordId {
        loop {
            let id = RecordId::Local(Uuid::new_v4());
            if !is_taken(id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    static NOTE: SetSchema = SetSchema::new("note", &[]);

    #[test]
    fn generated_ids_are_local() {
        let mut generator = UuidGenerator::new();
        let id = generator.generate(&NOTE, &|_| false);
        assert!(id.is_local());
    }

    #[test]
    fn generated_ids_are_unique() {
        let mut generator = UuidGenerator::new();
        let ids: HashSet<_> = (0..1000)
            .map(|_| generator.generate(&NOTE, &|_| false))
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn taken_ids_are_skipped() {
        let mut generator = UuidGenerator::new();
        let first = generator.generate(&NOTE, &|_| false);
        let second = generator.generate(&NOTE, &|id| id == first);
        assert_ne!(first, second);
    }
}
