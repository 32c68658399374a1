//! Values stored by the key-value store
//!
//! An object is a set of named attributes under a key inside a space.
//! Searches select objects by predicates over those attributes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Object key inside a space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Named attributes of one object
pub type Attributes = BTreeMap<String, Value>;

impl Value {
    /// Name of the value type, as reported in `WrongType` errors
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Order two scalar values. Ints and floats compare numerically,
    /// strings lexically; anything else is unordered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Membership test used by `Comparison::Contains`
    #[must_use]
    pub fn contains(&self, needle: &Value) -> bool {
        match (self, needle) {
            (Self::List(items), _) => items.contains(needle),
            (Self::Map(entries), Self::Str(k)) => entries.contains_key(k),
            (Self::Str(hay), Self::Str(n)) => hay.contains(n.as_str()),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

/// Comparison operator of a search predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    LessThan,
    LessEqual,
    GreaterEqual,
    GreaterThan,
    Contains,
}

/// `attribute <comparison> value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub attribute: String,
    pub comparison: Comparison,
    pub value: Value,
}

impl Predicate {
    #[must_use]
    pub fn new(attribute: &str, comparison: Comparison, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.to_string(),
            comparison,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn equals(attribute: &str, value: impl Into<Value>) -> Self {
        Self::new(attribute, Comparison::Equals, value)
    }

    /// Check the predicate against an object; a missing attribute never matches
    #[must_use]
    pub fn matches(&self, attributes: &Attributes) -> bool {
        let Some(actual) = attributes.get(&self.attribute) else {
            return false;
        };
        match self.comparison {
            Comparison::Equals => actual == &self.value,
            Comparison::Contains => actual.contains(&self.value),
            Comparison::LessThan => actual.compare(&self.value) == Some(Ordering::Less),
            Comparison::LessEqual => matches!(
                actual.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Comparison::GreaterEqual => matches!(
                actual.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Comparison::GreaterThan => actual.compare(&self.value) == Some(Ordering::Greater),
        }
    }
}

/// Build an `Attributes` map from `name => value` pairs
///
/// ```
/// use store_api::{attributes, Value};
///
/// let attrs = attributes! { "v" => "towels", "n" => 42 };
/// assert_eq!(attrs["n"], Value::Int(42));
/// ```
#[macro_export]
macro_rules! attributes {
    () => { $crate::Attributes::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut attrs = $crate::Attributes::new();
        $( attrs.insert(($name).to_string(), $crate::Value::from($value)); )+
        attrs
    }};
}
