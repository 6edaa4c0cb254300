use crate::document::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by a [`FilterCondition::Field`] predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Field equals the value. Numbers compare by value (`1 == 1.0`).
    Eq,
    /// Field is absent or differs from the value.
    Ne,
    /// String field contains the value as a substring, or array field
    /// contains an element equal to the value.
    Contains,
    /// Field equals one of the elements of the (array) value.
    In,
    /// Field is greater than the value (numbers or strings).
    Gt,
    /// Field is greater than or equal to the value.
    Gte,
    /// Field is less than the value.
    Lt,
    /// Field is less than or equal to the value.
    Lte,
    /// Field presence matches the boolean value (`true` when not a bool).
    Exists,
}

/// Structured predicate over document metadata.
///
/// Passed unchanged from the caller to the token store, which evaluates it
/// before selecting nearest neighbours. Field names may be dotted paths into
/// nested JSON objects (`"source.kind"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    /// Compare one metadata field against a value.
    Field {
        field: String,
        op: FilterOp,
        value: Value,
    },
    /// Every inner condition holds (true when empty).
    All(Vec<FilterCondition>),
    /// At least one inner condition holds (false when empty).
    Any(Vec<FilterCondition>),
    /// The inner condition does not hold.
    Not(Box<FilterCondition>),
}

impl FilterCondition {
    /// Build a single-field predicate.
    pub fn field(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self::Field {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FilterOp::Eq, value)
    }

    /// Substring or array-membership match.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, FilterOp::Contains, value)
    }

    /// Conjunction of this condition and `other`.
    pub fn and(self, other: FilterCondition) -> Self {
        match self {
            Self::All(mut inner) => {
                inner.push(other);
                Self::All(inner)
            }
            first => Self::All(vec![first, other]),
        }
    }

    /// Negation of this condition.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate the predicate against a document's metadata.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Field { field, op, value } => {
                evaluate(*op, lookup(metadata, field), value)
            }
            Self::All(inner) => inner.iter().all(|c| c.matches(metadata)),
            Self::Any(inner) => inner.iter().any(|c| c.matches(metadata)),
            Self::Not(inner) => !inner.matches(metadata),
        }
    }
}

/// Resolve a possibly dotted field name. A literal key wins over a path.
fn lookup<'a>(metadata: &'a Metadata, field: &str) -> Option<&'a Value> {
    if let Some(v) = metadata.get(field) {
        return Some(v);
    }
    let mut parts = field.split('.');
    let mut current = metadata.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn evaluate(op: FilterOp, actual: Option<&Value>, expected: &Value) -> bool {
    match (op, actual) {
        (FilterOp::Exists, actual) => actual.is_some() == expected.as_bool().unwrap_or(true),
        (FilterOp::Ne, actual) => actual.map_or(true, |a| !values_equal(a, expected)),
        (_, None) => false,
        (FilterOp::Eq, Some(actual)) => values_equal(actual, expected),
        (FilterOp::Contains, Some(actual)) => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        (FilterOp::In, Some(actual)) => expected
            .as_array()
            .is_some_and(|options| options.iter().any(|o| values_equal(actual, o))),
        (FilterOp::Gt, Some(actual)) => compare(actual, expected) == Some(Ordering::Greater),
        (FilterOp::Gte, Some(actual)) => matches!(
            compare(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        (FilterOp::Lt, Some(actual)) => compare(actual, expected) == Some(Ordering::Less),
        (FilterOp::Lte, Some(actual)) => matches!(
            compare(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_eq_and_ne() {
        let m = meta(json!({"category": "education", "year": 2024}));
        assert!(FilterCondition::eq("category", "education").matches(&m));
        assert!(!FilterCondition::eq("category", "technical").matches(&m));
        assert!(FilterCondition::eq("year", 2024.0).matches(&m));
        assert!(FilterCondition::field("category", FilterOp::Ne, "technical").matches(&m));
        // Missing fields are "not equal" to anything.
        assert!(FilterCondition::field("missing", FilterOp::Ne, "x").matches(&m));
        assert!(!FilterCondition::eq("missing", "x").matches(&m));
    }

    #[test]
    fn test_contains_string_and_array() {
        let m = meta(json!({"source": "course notes", "tags": ["ai", "ml"]}));
        assert!(FilterCondition::contains("source", "course").matches(&m));
        assert!(!FilterCondition::contains("source", "blog").matches(&m));
        assert!(FilterCondition::contains("tags", "ml").matches(&m));
        assert!(!FilterCondition::contains("tags", "db").matches(&m));
    }

    #[test]
    fn test_in_and_ranges() {
        let m = meta(json!({"topic": "search", "rank": 3}));
        assert!(FilterCondition::field("topic", FilterOp::In, json!(["search", "ai"])).matches(&m));
        assert!(!FilterCondition::field("topic", FilterOp::In, json!("search")).matches(&m));
        assert!(FilterCondition::field("rank", FilterOp::Gt, 2).matches(&m));
        assert!(FilterCondition::field("rank", FilterOp::Gte, 3).matches(&m));
        assert!(FilterCondition::field("rank", FilterOp::Lt, 4).matches(&m));
        assert!(!FilterCondition::field("rank", FilterOp::Lte, 2).matches(&m));
        // Mixed types never compare.
        assert!(!FilterCondition::field("rank", FilterOp::Gt, "2").matches(&m));
    }

    #[test]
    fn test_exists() {
        let m = meta(json!({"a": null}));
        assert!(FilterCondition::field("a", FilterOp::Exists, true).matches(&m));
        assert!(FilterCondition::field("b", FilterOp::Exists, false).matches(&m));
        assert!(!FilterCondition::field("b", FilterOp::Exists, Value::Null).matches(&m));
    }

    #[test]
    fn test_dotted_path() {
        let m = meta(json!({"source": {"kind": "wiki", "lang": "en"}, "a.b": 1}));
        assert!(FilterCondition::eq("source.kind", "wiki").matches(&m));
        assert!(!FilterCondition::eq("source.kind.deeper", "wiki").matches(&m));
        assert!(FilterCondition::eq("a.b", 1).matches(&m));
    }

    #[test]
    fn test_combinators() {
        let m = meta(json!({"category": "education", "topic": "ai"}));
        let both =
            FilterCondition::eq("category", "education").and(FilterCondition::eq("topic", "ai"));
        assert!(both.matches(&m));
        assert!(!both.clone().negate().matches(&m));
        assert!(FilterCondition::All(vec![]).matches(&m));
        assert!(!FilterCondition::Any(vec![]).matches(&m));
        let either = FilterCondition::Any(vec![
            FilterCondition::eq("topic", "db"),
            FilterCondition::eq("topic", "ai"),
        ]);
        assert!(either.matches(&m));
    }

    #[test]
    fn test_serde_shape() {
        let cond = FilterCondition::eq("category", "education");
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(
            json,
            json!({"field": {"field": "category", "op": "eq", "value": "education"}})
        );
        let back: FilterCondition = serde_json::from_value(json).unwrap();
        assert_eq!(back, cond);
    }
}
