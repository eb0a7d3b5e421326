//! A single dataset entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field carrying a record's stable position id.
pub const INDEX_FIELD: &str = "idx";

/// One line of a JSONL dataset: an ordered map of named fields.
///
/// Field order is preserved through a read/write cycle so that rewriting
/// a file only appends fields, never reorders them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The record's `idx`, if present and a non-negative integer.
    pub fn idx(&self) -> Option<u64> {
        self.fields.get(INDEX_FIELD).and_then(Value::as_u64)
    }

    /// Whether the record carries an `idx` field of any type.
    pub fn has_idx(&self) -> bool {
        self.fields.contains_key(INDEX_FIELD)
    }

    /// Set the record's `idx`.
    pub fn set_idx(&mut self, idx: u64) {
        self.fields.insert(INDEX_FIELD.to_string(), Value::from(idx));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as a string slice, if it is a JSON string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_idx_accessors() {
        let mut record: Record = serde_json::from_value(json!({"question": "why?"}))
            .expect("object should deserialize");
        assert!(!record.has_idx());
        assert_eq!(record.idx(), None);

        record.set_idx(7);
        assert!(record.has_idx());
        assert_eq!(record.idx(), Some(7));
    }

    #[test]
    fn test_negative_or_string_idx_is_not_an_id() {
        let record: Record =
            serde_json::from_value(json!({"idx": -1})).expect("object should deserialize");
        assert!(record.has_idx());
        assert_eq!(record.idx(), None);

        let record: Record =
            serde_json::from_value(json!({"idx": "3"})).expect("object should deserialize");
        assert_eq!(record.idx(), None);
    }

    #[test]
    fn test_field_order_preserved_on_serialize() {
        let mut record: Record = serde_json::from_str(r#"{"zeta":1,"alpha":"a"}"#)
            .expect("object should deserialize");
        record.set_idx(0);

        let line = serde_json::to_string(&record).expect("serialization should succeed");
        assert_eq!(line, r#"{"zeta":1,"alpha":"a","idx":0}"#);
    }
}
