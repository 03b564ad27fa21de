//! Raw record value model.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Identifier of a stored record.
///
/// Two disjoint id spaces exist:
/// - `Remote` ids are small integers assigned by the remote service
/// - `Local` ids are UUIDs assigned before the remote side knows the record
///
/// A record carrying a `Local` id has never been acknowledged by the remote
/// service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordId {
    /// Identifier assigned by the remote service.
    Remote(u64),
    /// Process-local placeholder identifier.
    Local(Uuid),
}

impl RecordId {
    /// Creates a fresh random local identifier.
    #[must_use]
    pub fn new_local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// Returns true for a local placeholder id.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns true for an id assigned by the remote service.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Returns the remote number, if any.
    #[must_use]
    pub fn remote(&self) -> Option<u64> {
        match self {
            Self::Remote(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "RecordId({id})"),
            Self::Local(uuid) => write!(f, "RecordId(local:{uuid})"),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "{id}"),
            Self::Local(uuid) => write!(f, "local:{uuid}"),
        }
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self::Local(uuid)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self::Remote(id)
    }
}

/// A scalar, identifier or list stored in a raw record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Record identifier, used for primary and foreign keys.
    Id(RecordId),
    /// List of values, used for to-many foreign keys.
    List(Vec<Value>),
}

impl Value {
    /// Returns true for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the text content, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the identifier, if this is an id.
    #[must_use]
    pub fn as_id(&self) -> Option<RecordId> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Orders two values of the same kind.
    ///
    /// Returns `None` when the kinds differ or the kind has no natural
    /// order (lists, local ids against remote ids).
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Id(RecordId::Remote(a)), Value::Id(RecordId::Remote(b))) => Some(a.cmp(b)),
            (Value::Id(RecordId::Remote(a)), Value::Integer(b))
            | (Value::Integer(b), Value::Id(RecordId::Remote(a))) => {
                let ord = i64::try_from(*a).map_or(Ordering::Greater, |a| a.cmp(b));
                if matches!(self, Value::Integer(_)) {
                    Some(ord.reverse())
                } else {
                    Some(ord)
                }
            }
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Loose equality used by lookups: remote ids equal their integer form.
    #[must_use]
    pub fn matches(&self, other: &Value) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<RecordId> for Value {
    fn from(value: RecordId) -> Self {
        Value::Id(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// An unresolved field mapping as stored by the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, Value>);

impl RawRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Returns a mutable field value.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    /// Returns the identifier stored under `id_name`.
    ///
    /// `Null` and remote id `0` both count as "no id".
    #[must_use]
    pub fn id(&self, id_name: &str) -> Option<RecordId> {
        match self.0.get(id_name) {
            Some(Value::Id(RecordId::Remote(0))) => None,
            Some(Value::Id(id)) => Some(*id),
            _ => None,
        }
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Iterates fields mutably in name order.
    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Value> {
        self.0.iter_mut()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a RawRecord {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// An ordered collection of raw records for one set name.
pub type RecordSet = Vec<RawRecord>;
