//! Dynamic value model shared by records, predicates and the index.
//!
//! Blobs carry schemaless rows, so a decoded cell is a tagged variant rather
//! than a typed column. Comparison semantics live here so the evaluator and
//! the index builder agree on equality: `Int` and `Float` compare numerically,
//! and `Date` compares against ISO-formatted strings, which is how calendar
//! fields usually arrive in line-oriented blobs.

use std::{cmp::Ordering, fmt};

use chrono::NaiveDate;

/// A single decoded field value.
#[derive(Clone, Debug)]
pub enum Value {
    /// Absent or JSON null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Ordered sequence of values; elements are indexed individually.
    List(Vec<Value>),
}

impl Value {
    /// Whether this value is the null/absent marker.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Equality with numeric and date/string coercion.
    #[must_use]
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Date(_), Value::Str(_)) | (Value::Str(_), Value::Date(_)) => {
                self.index_key() == other.index_key()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_value(y))
            }
            _ => false,
        }
    }

    /// Ordering with the same coercions as [`Value::eq_value`].
    ///
    /// Returns `None` for incomparable pairs (including anything involving
    /// `Null`), which the evaluator treats as "comparison not satisfied".
    #[must_use]
    pub fn cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            // ISO date strings order the same way the dates do.
            (Value::Date(_), Value::Str(_)) | (Value::Str(_), Value::Date(_)) => {
                Some(self.index_key().cmp(&other.index_key()))
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Membership test used by the `CONTAINS` operator: true when this
    /// value is a sequence holding an element equal to `needle`. Scalars
    /// never contain anything; substring matching belongs to `LIKE`.
    #[must_use]
    pub fn contains_value(&self, needle: &Value) -> bool {
        match self {
            Value::List(items) => items.iter().any(|item| item.eq_value(needle)),
            _ => false,
        }
    }

    /// Canonical text form fed to the index hash.
    ///
    /// Build and search sides MUST produce the same key for values that are
    /// equal under [`Value::eq_value`], otherwise index candidates miss rows.
    #[must_use]
    pub fn index_key(&self) -> String {
        self.to_string()
    }

    /// Decode from a JSON value. Objects have no variant of their own and
    /// are kept as their serialized text.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Str(json.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_value(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
