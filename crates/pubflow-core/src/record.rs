//! Loosely-typed key-value records passed between stages and collaborators

use serde_json::Value;

/// A JSON object. Classifier inputs, predictions' source documents and
/// stored documents all travel in this shape.
pub type Record = serde_json::Map<String, Value>;

/// Field lookup for items that a projection can read from.
pub trait FieldAccess {
    fn field(&self, name: &str) -> Option<&Value>;
}

impl FieldAccess for Record {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl FieldAccess for Value {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Read a string-ish field: strings as-is, numbers rendered, anything else `None`.
///
/// PubMed ids show up both as `"12345"` and `12345` depending on who wrote the record.
pub fn field_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
