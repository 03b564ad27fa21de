//! Declarative field-comparison predicates.
//!
//! A query is a list of lookups keyed `"field.operator"` plus a combinator.
//! The operator suffix is optional and defaults to equality; fields may be
//! dotted paths through resolved related records (`"group.label"`).
//!
//! ```rust
//! use sshconf_core::{Query, Record, SetSchema};
//!
//! static PERSON: SetSchema = SetSchema::new("person", &[]);
//!
//! let query = Query::new().with("age.ge", 5).with("age.le", 10);
//! assert!(query.matches(&Record::new(&PERSON).with("age", 7)));
//! assert!(!query.matches(&Record::new(&PERSON).with("age", 11)));
//! ```

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use sshconf_storage::{RawRecord, Value};
use std::cmp::Ordering;
use std::fmt;

/// How the lookups of a query combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Union {
    /// Every lookup must match (logical AND).
    #[default]
    All,
    /// At least one lookup must match (logical OR).
    Any,
}

/// Comparison applied by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal (default when no suffix is given).
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Field value is one of a list.
    In,
    /// Text contains a substring, or list contains an item.
    Contains,
}

impl Operator {
    /// Parses an operator suffix.
    #[must_use]
    pub fn parse(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "ge" => Some(Self::Ge),
            "le" => Some(Self::Le),
            "in" => Some(Self::In),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    /// Returns the suffix form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::In => "in",
            Self::Contains => "contains",
        }
    }

    /// Applies the operator. `actual` is the record's value, `expected` the
    /// query's.
    #[must_use]
    pub fn apply(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Self::Eq => actual.matches(expected),
            Self::Ne => !actual.matches(expected),
            Self::Gt => actual.compare(expected) == Some(Ordering::Greater),
            Self::Lt => actual.compare(expected) == Some(Ordering::Less),
            Self::Ge => matches!(
                actual.compare(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Le => matches!(
                actual.compare(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::In => expected
                .as_list()
                .is_some_and(|items| items.iter().any(|item| actual.matches(item))),
            Self::Contains => match (actual, expected) {
                (Value::Text(haystack), Value::Text(needle)) => haystack.contains(needle.as_str()),
                (Value::List(items), needle) => items.iter().any(|item| item.matches(needle)),
                _ => false,
            },
        }
    }
}

/// One `"field.operator" = value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    path: Vec<String>,
    operator: Operator,
    value: Value,
}

impl Lookup {
    /// Splits `key` into a field path and an optional operator suffix.
    #[must_use]
    pub fn new(key: &str, value: impl Into<Value>) -> Self {
        let mut path: Vec<String> = key.split('.').map(str::to_owned).collect();
        let operator = match path.last().and_then(|last| Operator::parse(last)) {
            Some(operator) if path.len() > 1 => {
                path.pop();
                operator
            }
            _ => Operator::Eq,
        };
        Self {
            path,
            operator,
            value: value.into(),
        }
    }

    /// Returns the field path.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Returns the operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Evaluates against a (possibly resolved) record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.lookup(&self.path).unwrap_or(&Value::Null);
        self.operator.apply(actual, &self.value)
    }

    /// Evaluates against raw fields. Dotted paths never match raw records.
    #[must_use]
    pub fn matches_raw(&self, raw: &RawRecord) -> bool {
        match self.path.as_slice() {
            [field] => {
                let actual = raw.get(field).unwrap_or(&Value::Null);
                self.operator.apply(actual, &self.value)
            }
            _ => false,
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.path.iter().any(String::is_empty) {
            return Err(CoreError::invalid_query(format!(
                "empty field name in lookup {self}"
            )));
        }
        if self.operator == Operator::In && self.value.as_list().is_none() {
            return Err(CoreError::invalid_query(format!(
                "lookup {self} needs a list value"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}={:?}",
            self.path.join("."),
            self.operator.as_str(),
            self.value
        )
    }
}

/// A set of lookups combined with a [`Union`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    lookups: Vec<Lookup>,
    union: Union,
}

impl Query {
    /// Creates an empty query whose lookups must all match.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty query where any lookup may match.
    #[must_use]
    pub fn any() -> Self {
        Self::new().union(Union::Any)
    }

    /// Sets the combinator.
    #[must_use]
    pub fn union(mut self, union: Union) -> Self {
        self.union = union;
        self
    }

    /// Adds a `"field.operator"` lookup.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.lookups.push(Lookup::new(key, value));
        self
    }

    /// Builds a query from `(key, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] if a key has an empty field name
    /// or an `in` lookup is not given a list.
    pub fn from_pairs<K, V, I>(pairs: I, union: Union) -> CoreResult<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let query = Self {
            lookups: pairs
                .into_iter()
                .map(|(key, value)| Lookup::new(key.as_ref(), value))
                .collect(),
            union,
        };
        query.validate()?;
        Ok(query)
    }

    /// Returns the lookups.
    #[must_use]
    pub fn lookups(&self) -> &[Lookup] {
        &self.lookups
    }

    /// Returns the combinator.
    #[must_use]
    pub fn combinator(&self) -> Union {
        self.union
    }

    /// Checks every lookup key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for a malformed lookup.
    pub fn validate(&self) -> CoreResult<()> {
        self.lookups.iter().try_for_each(Lookup::validate)
    }

    /// Evaluates against a (possibly resolved) record.
    ///
    /// An empty `All` query matches everything; an empty `Any` query
    /// matches nothing.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.combine(|lookup| lookup.matches(record))
    }

    /// Evaluates against raw fields.
    #[must_use]
    pub fn matches_raw(&self, raw: &RawRecord) -> bool {
        self.combine(|lookup| lookup.matches_raw(raw))
    }

    fn combine(&self, test: impl Fn(&Lookup) -> bool) -> bool {
        match self.union {
            Union::All => self.lookups.iter().all(test),
            Union::Any => self.lookups.iter().any(test),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.lookups.iter().map(ToString::to_string).collect();
        let union = match self.union {
            Union::All => "all",
            Union::Any => "any",
        };
        write!(f, "{} ({union})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Relation, SetSchema};
    use proptest::prelude::*;
    use sshconf_storage::RecordId;

    static CLUB: SetSchema = SetSchema::new("club", &[]);
    static PERSON: SetSchema = SetSchema::new("person", &[Relation::one("club", &CLUB)]);

    fn person(name: &str, age: i64) -> Record {
        Record::new(&PERSON).with("name", name).with("age", age)
    }

    #[test]
    fn key_parsing() {
        let lookup = Lookup::new("age.ge", 5);
        assert_eq!(lookup.path(), ["age".to_string()]);
        assert_eq!(lookup.operator(), Operator::Ge);

        let lookup = Lookup::new("label", "web");
        assert_eq!(lookup.operator(), Operator::Eq);

        let lookup = Lookup::new("club.name", "chess");
        assert_eq!(lookup.path().len(), 2);
        assert_eq!(lookup.operator(), Operator::Eq);

        // A bare operator name is a field, not an operator.
        let lookup = Lookup::new("in", 1);
        assert_eq!(lookup.path(), ["in".to_string()]);
        assert_eq!(lookup.operator(), Operator::Eq);
    }

    #[test]
    fn all_is_intersection_any_is_union() {
        let all = Query::new().with("age.ge", 5).with("age.le", 10);
        let any = all.clone().union(Union::Any);

        assert!(all.matches(&person("a", 7)));
        assert!(!all.matches(&person("b", 3)));
        assert!(!all.matches(&person("c", 12)));

        assert!(any.matches(&person("b", 3)));
        assert!(any.matches(&person("c", 12)));
    }

    #[test]
    fn every_operator() {
        let ann = person("ann", 30);
        assert!(Query::new().with("name", "ann").matches(&ann));
        assert!(Query::new().with("name.eq", "ann").matches(&ann));
        assert!(Query::new().with("name.ne", "bob").matches(&ann));
        assert!(Query::new().with("age.gt", 29).matches(&ann));
        assert!(!Query::new().with("age.gt", 30).matches(&ann));
        assert!(Query::new().with("age.lt", 31).matches(&ann));
        assert!(Query::new().with("age.ge", 30).matches(&ann));
        assert!(Query::new().with("age.le", 30).matches(&ann));
        assert!(Query::new()
            .with("name.in", vec!["bob", "ann"])
            .matches(&ann));
        assert!(!Query::new().with("name.in", vec!["bob"]).matches(&ann));
        assert!(Query::new().with("name.contains", "nn").matches(&ann));
    }

    #[test]
    fn ordering_across_kinds_never_matches() {
        let ann = person("ann", 30);
        assert!(!Query::new().with("age.gt", "10").matches(&ann));
        assert!(!Query::new().with("name.lt", 100).matches(&ann));
    }

    #[test]
    fn missing_field_is_null() {
        let ann = person("ann", 30);
        assert!(Query::new().with("email", Value::Null).matches(&ann));
        assert!(!Query::new().with("email.ge", 1).matches(&ann));
        assert!(Query::new().with("email.ne", "x").matches(&ann));
    }

    #[test]
    fn empty_queries() {
        let ann = person("ann", 30);
        assert!(Query::new().matches(&ann));
        assert!(!Query::any().matches(&ann));
    }

    #[test]
    fn dotted_path_through_related() {
        let mut club = Record::new(&CLUB).with("name", "chess");
        club.set_id(RecordId::Remote(1));
        let mut ann = person("ann", 30);
        ann.set_related("club", club).unwrap();

        assert!(Query::new().with("club.name", "chess").matches(&ann));
        assert!(!Query::new().with("club.name", "go").matches(&ann));
        // Raw fields cannot be traversed.
        assert!(!Query::new().with("club.name", "chess").matches_raw(ann.raw()));
    }

    #[test]
    fn raw_matching() {
        let ann = person("ann", 30);
        assert!(Query::new().with("age.ge", 18).matches_raw(ann.raw()));
    }

    #[test]
    fn id_lookup_accepts_integer() {
        let mut ann = person("ann", 30);
        ann.set_id(RecordId::Remote(42));
        assert!(Query::new().with("id", 42).matches(&ann));
        assert!(Query::new().with("id", RecordId::Remote(42)).matches(&ann));
    }

    #[test]
    fn from_pairs_validates() {
        let query = Query::from_pairs([("age.ge", 5), ("age.le", 10)], Union::All).unwrap();
        assert_eq!(query.lookups().len(), 2);
        assert_eq!(query.combinator(), Union::All);

        let err = Query::from_pairs([("age..ge", 5)], Union::All).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));

        let err = Query::from_pairs([("age.in", 5)], Union::Any).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));
    }

    #[test]
    fn display_lists_lookups() {
        let query = Query::new().with("age.ge", 5);
        let text = query.to_string();
        assert!(text.contains("age.ge"));
        assert!(text.ends_with("(all)"));
    }

    proptest! {
        #[test]
        fn range_query_selects_exactly_the_range(
            ages in prop::collection::vec(0i64..20, 0..40),
            low in 0i64..20,
            high in 0i64..20,
        ) {
            let all = Query::new().with("age.ge", low).with("age.le", high);
            let any = all.clone().union(Union::Any);
            for age in ages {
                let record = person("p", age);
                prop_assert_eq!(all.matches(&record), low <= age && age <= high);
                prop_assert_eq!(any.matches(&record), age >= low || age <= high);
            }
        }
    }
}
