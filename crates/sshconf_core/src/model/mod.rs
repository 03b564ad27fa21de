//! Typed models over schema-bound records.

use crate::record::Record;
use crate::schema::SetSchema;

/// Declares a newtype model over [`Record`].
///
/// ```rust,ignore
/// model! {
///     /// A saved shell command.
///     Snippet => SNIPPET
/// }
/// ```
#[macro_export]
macro_rules! model {
    ($(#[$meta:meta])* $name:ident => $schema:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name($crate::Record);

        impl $crate::Model for $name {
            fn schema() -> &'static $crate::SetSchema {
                &$schema
            }

            fn from_record(record: $crate::Record) -> Self {
                Self(record)
            }

            fn record(&self) -> &$crate::Record {
                &self.0
            }

            fn into_record(self) -> $crate::Record {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = $crate::Record;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
    };
}

mod terminal;

pub use terminal::{
    Group, Host, PfRule, Snippet, SshConfig, SshIdentity, SshKey, Tag, TagHost, GROUP, HOST,
    PF_RULE, SNIPPET, SSH_CONFIG, SSH_IDENTITY, SSH_KEY, TAG, TAG_HOST, TERMINAL_SCHEMAS,
};

/// A record wrapped with type-specific accessors.
///
/// Implementors are thin newtypes; every storage operation works on the
/// underlying [`Record`].
pub trait Model: Sized {
    /// Schema of the record set holding this type.
    fn schema() -> &'static SetSchema;

    /// Wraps a record of this type's set.
    fn from_record(record: Record) -> Self;

    /// Returns the underlying record.
    fn record(&self) -> &Record;

    /// Unwraps the underlying record.
    fn into_record(self) -> Record;
}

