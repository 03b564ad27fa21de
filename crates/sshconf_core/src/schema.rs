//! Record set schemas.
//!
//! A schema describes the identity/ownership shape of one record set: its
//! name, the field holding the identifier and the foreign-key fields that
//! point at other sets. Field values themselves are schema-less.

use std::fmt;

/// How many records a foreign-key field references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single id (or null).
    One,
    /// A list of ids.
    Many,
}

/// A foreign-key field of a record set.
#[derive(Clone, Copy)]
pub struct Relation {
    /// Field holding the referenced id(s).
    pub field: &'static str,
    /// Schema of the referenced set.
    pub target: &'static SetSchema,
    /// Whether the field holds one id or a list of ids.
    pub cardinality: Cardinality,
}

impl Relation {
    /// Declares a to-one foreign key.
    #[must_use]
    pub const fn one(field: &'static str, target: &'static SetSchema) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::One,
        }
    }

    /// Declares a to-many foreign key.
    #[must_use]
    pub const fn many(field: &'static str, target: &'static SetSchema) -> Self {
        Self {
            field,
            target,
            cardinality: Cardinality::Many,
        }
    }
}

impl fmt::Debug for Relation {
    // Targets may point back at their owner; print names only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("field", &self.field)
            .field("target", &self.target.set_name)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// Identity and relation shape of a record set.
///
/// Schemas are declared as statics so relations can reference each other,
/// including themselves:
///
/// ```rust
/// use sshconf_core::{Relation, SetSchema};
///
/// static FOLDER: SetSchema = SetSchema::new("folder", &[Relation::one("parent", &FOLDER)]);
/// assert_eq!(FOLDER.relation("parent").unwrap().target.set_name, "folder");
/// ```
#[derive(Clone, Copy)]
pub struct SetSchema {
    /// Name of the record set in the driver.
    pub set_name: &'static str,
    /// Field holding the record identifier.
    pub id_name: &'static str,
    /// Foreign-key fields.
    pub relations: &'static [Relation],
}

impl SetSchema {
    /// Prefix reserved for bookkeeping sets.
    pub const RESERVED_PREFIX: &'static str = "__";

    /// Declares a schema whose identifier lives in the `id` field.
    #[must_use]
    pub const fn new(set_name: &'static str, relations: &'static [Relation]) -> Self {
        Self {
            set_name,
            id_name: "id",
            relations,
        }
    }

    /// Overrides the identifier field.
    #[must_use]
    pub const fn with_id_name(mut self, id_name: &'static str) -> Self {
        self.id_name = id_name;
        self
    }

    /// Returns the relation declared on `field`.
    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.field == field)
    }

    /// Iterates the relations of this schema that point at `target`.
    pub fn relations_to<'a>(
        &'a self,
        target: &'a SetSchema,
    ) -> impl Iterator<Item = &'static Relation> + 'a {
        self.relations.iter().filter(move |r| r.target == target)
    }

    /// Returns true if the set name collides with bookkeeping sets.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.set_name.starts_with(Self::RESERVED_PREFIX)
    }
}

impl PartialEq for SetSchema {
    fn eq(&self, other: &Self) -> bool {
        self.set_name == other.set_name
    }
}

impl Eq for SetSchema {}

impl fmt::Debug for SetSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetSchema")
            .field("set_name", &self.set_name)
            .field("id_name", &self.id_name)
            .field("relations", &self.relations)
            .finish()
    }
}
