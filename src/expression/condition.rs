//! Typed condition and filter expressions.
//!
//! A `Condition` is evaluated by the backend against the current stored item,
//! atomically with the write it guards. `None` as the item means "no such key".

use std::fmt;

use serde_json::Value;

use crate::params;
use crate::storage::Item;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    /// Attribute present and equal to the value
    Equals(String, Value),
    /// Attribute present and different from the value
    NotEquals(String, Value),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeExists(attribute.into())
    }

    pub fn not_exists(attribute: impl Into<String>) -> Self {
        Condition::AttributeNotExists(attribute.into())
    }

    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Equals(attribute.into(), value.into())
    }

    pub fn not_equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::NotEquals(attribute.into(), value.into())
    }

    /// `attribute_not_exists(Deleted) OR Deleted <> 1`
    pub fn not_deleted() -> Self {
        Condition::Or(vec![
            Condition::not_exists(params::DELETED),
            Condition::not_equals(params::DELETED, 1),
        ])
    }

    /// Conjunction, flattening nested ANDs
    pub fn and(self, other: Condition) -> Self {
        let mut parts = match self {
            Condition::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::And(parts)
    }

    /// Disjunction, flattening nested ORs
    pub fn or(self, other: Condition) -> Self {
        let mut parts = match self {
            Condition::Or(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::Or(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::Or(parts)
    }

    /// AND of all parts; `None` when there are none
    pub fn all(parts: Vec<Condition>) -> Option<Condition> {
        parts.into_iter().reduce(Condition::and)
    }

    /// Equality conjunction over a set of attribute/value pairs
    pub fn matching<'a>(fields: impl IntoIterator<Item = (&'a String, &'a Value)>) -> Option<Condition> {
        Self::all(
            fields
                .into_iter()
                .map(|(k, v)| Condition::Equals(k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let lookup = |attribute: &str| item.and_then(|i| i.get(attribute));
        match self {
            Condition::AttributeExists(a) => lookup(a).is_some(),
            Condition::AttributeNotExists(a) => lookup(a).is_none(),
            Condition::Equals(a, expected) => {
                lookup(a).map_or(false, |actual| values_equal(actual, expected))
            }
            Condition::NotEquals(a, expected) => {
                lookup(a).map_or(false, |actual| !values_equal(actual, expected))
            }
            Condition::And(parts) => parts.iter().all(|c| c.evaluate(item)),
            Condition::Or(parts) => parts.iter().any(|c| c.evaluate(item)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::AttributeExists(a) => write!(f, "attribute_exists({})", a),
            Condition::AttributeNotExists(a) => write!(f, "attribute_not_exists({})", a),
            Condition::Equals(a, v) => write!(f, "{} = {}", a, v),
            Condition::NotEquals(a, v) => write!(f, "{} <> {}", a, v),
            Condition::And(parts) => write_joined(f, parts, " AND "),
            Condition::Or(parts) => write_joined(f, parts, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Condition], separator: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "{}", part)?;
    }
    write!(f, ")")
}

/// JSON equality where numbers compare by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_item() {
        assert!(Condition::not_exists("id").evaluate(None));
        assert!(!Condition::exists("id").evaluate(None));
        assert!(!Condition::equals("id", "A").evaluate(None));
        assert!(!Condition::not_equals("id", "A").evaluate(None));
    }

    #[test]
    fn test_not_deleted_filter() {
        let live = item(json!({"id": "A"}));
        let restored = item(json!({"id": "A", "Deleted": 0}));
        let deleted = item(json!({"id": "A", "Deleted": 1}));
        assert!(Condition::not_deleted().evaluate(Some(&live)));
        assert!(Condition::not_deleted().evaluate(Some(&restored)));
        assert!(!Condition::not_deleted().evaluate(Some(&deleted)));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let stored = item(json!({"ItemVersion": 3.0}));
        assert!(Condition::equals("ItemVersion", 3).evaluate(Some(&stored)));
        assert!(!Condition::equals("ItemVersion", 2).evaluate(Some(&stored)));
    }

    #[test]
    fn test_and_flattens_and_renders() {
        let c = Condition::exists("id")
            .and(Condition::equals("color", "red"))
            .and(Condition::not_deleted());
        match &c {
            Condition::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(
            c.to_string(),
            "(attribute_exists(id) AND color = \"red\" AND (attribute_not_exists(Deleted) OR Deleted <> 1))"
        );
    }

    #[test]
    fn test_all_of_nothing() {
        assert!(Condition::all(vec![]).is_none());
        assert_eq!(
            Condition::all(vec![Condition::exists("a")]),
            Some(Condition::exists("a"))
        );
    }
}
