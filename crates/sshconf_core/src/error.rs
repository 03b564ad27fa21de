//! Error types for sshconf core.

use sshconf_storage::{RecordId, StorageError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in storage engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Driver error, including an unreadable or corrupt backing file.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A lookup matched no record.
    #[error("no {set_name} record matches {lookup}")]
    NotFound {
        /// Set that was searched.
        set_name: String,
        /// Description of the lookup.
        lookup: String,
    },

    /// A single-record lookup matched more than one record.
    #[error("{count} {set_name} records match {lookup}, expected exactly one")]
    AmbiguousMatch {
        /// Set that was searched.
        set_name: String,
        /// Description of the lookup.
        lookup: String,
        /// Number of matches.
        count: usize,
    },

    /// Caller misuse: create with an id, update without one, and similar.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// A related model has not been saved and the save strategy does not
    /// persist related models.
    #[error("{set_name}.{field} references an unsaved {target} record")]
    UnresolvedReference {
        /// Set of the record being saved.
        set_name: String,
        /// Foreign key field.
        field: String,
        /// Set of the unsaved related record.
        target: String,
    },

    /// A set name is not registered with the storage.
    #[error("unknown record set: {name}")]
    UnknownSet {
        /// The set name.
        name: String,
    },

    /// A lookup key could not be parsed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// Storage configuration is unusable.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(set_name: impl Into<String>, lookup: impl Into<String>) -> Self {
        Self::NotFound {
            set_name: set_name.into(),
            lookup: lookup.into(),
        }
    }

    /// Creates a not found error for a record id.
    pub fn id_not_found(set_name: impl Into<String>, id: RecordId) -> Self {
        Self::not_found(set_name, format!("id={id}"))
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if a lookup matched nothing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
