//! Decoded row representation.

use std::collections::BTreeMap;

use crate::value::Value;

/// One decoded row: a field-name to [`Value`] mapping.
///
/// Fields keep no positional schema; missing fields read as [`Value::Null`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(field, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Decode a JSON object into a record. Non-object JSON is rejected by the
    /// caller; nested objects become opaque string values.
    #[must_use]
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: object
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        }
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Look up a field; absent fields are not distinguishable from explicit
    /// nulls at evaluation time.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value with the null/absent marker applied.
    #[must_use]
    pub fn value_or_null(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Number of fields present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(field, value)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Reduce to the requested column subset; requested fields missing from
    /// the record project to [`Value::Null`].
    #[must_use]
    pub fn project(&self, columns: &[String]) -> Record {
        Self {
            fields: columns
                .iter()
                .map(|c| (c.clone(), self.value_or_null(c)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_defaults_missing_fields_to_null() {
        let rec = Record::from_pairs([("name", Value::from("Harry Potter")), ("age", 11.into())]);
        let projected = rec.project(&["age".to_string(), "house".to_string()]);
        assert_eq!(projected.value_or_null("age"), Value::Int(11));
        assert_eq!(projected.value_or_null("house"), Value::Null);
        assert_eq!(projected.len(), 2);
    }
}
