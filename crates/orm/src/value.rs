//! Dynamic values stored in documents and collections
//!
//! `Object` and `Array` hold raw, not yet cast data. Once a value enters a
//! document it is cast: plain maps and lists become `Document` and
//! `Collection` nodes, which compare by identity.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use std::fmt;

use crate::collection::Collection;
use crate::document::Document;
use crate::graph::Node;
use crate::through::Through;

/// Ordered field map used for raw objects
pub type Map = IndexMap<String, Value>;

/// A value held by a document field or a collection entry
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Object(Map),
    Array(Vec<Value>),
    Document(Document),
    Collection(Collection),
    Through(Through),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for graph handles (documents, collections and through views)
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Document(_) | Value::Collection(_) | Value::Through(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_through(&self) -> Option<&Through> {
        match self {
            Value::Through(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The graph node behind this value, if any
    pub fn node(&self) -> Option<Node> {
        match self {
            Value::Document(d) => Some(Node::Document(d.clone())),
            Value::Collection(c) => Some(Node::Collection(c.clone())),
            _ => None,
        }
    }

    /// String form used to index entities by key. Keys compare as strings so
    /// `1` and `"1"` land in the same bucket.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            _ => None,
        }
    }

    /// Short name of the variant, used in messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
            Value::Collection(_) => "collection",
            Value::Through(_) => "through",
        }
    }

    /// True when both values are the same graph handle, or equal scalars
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Document(a), Value::Document(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b),
            (Value::Through(a), Value::Through(b)) => a.same_view(b),
            _ => self == other,
        }
    }

    /// Convert a scalar or raw value to JSON. Graph nodes are exported with
    /// their default export options.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Document(d) => d.data(&Default::default()).unwrap_or(serde_json::Value::Null),
            Value::Collection(c) => c.data(&Default::default()).unwrap_or(serde_json::Value::Null),
            Value::Through(t) => t.data(&Default::default()).unwrap_or(serde_json::Value::Null),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.ptr_eq(b),
            (Value::Through(a), Value::Through(b)) => a.same_view(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Integer(i) => write!(f, "Integer({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Document(d) => d.fmt(f),
            Value::Collection(c) => c.fmt(f),
            Value::Through(t) => t.fmt(f),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<Collection> for Value {
    fn from(value: Collection) -> Self {
        Value::Collection(value)
    }
}

impl From<Through> for Value {
    fn from(value: Through) -> Self {
        Value::Through(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"id": 1, "score": 8.5, "tags": ["a"], "name": null}));
        let map = value.as_object().unwrap();
        assert_eq!(map["id"], Value::Integer(1));
        assert_eq!(map["score"], Value::Float(8.5));
        assert_eq!(map["tags"], Value::Array(vec![Value::from("a")]));
        assert!(map["name"].is_null());
    }

    #[test]
    fn test_key_string() {
        assert_eq!(Value::Integer(1).key_string(), Value::from("1").key_string());
        assert_eq!(Value::Null.key_string(), None);
    }

    #[test]
    fn test_to_json_roundtrip_of_raw_values() {
        let raw = json!({"a": [1, 2, {"b": true}], "c": "d"});
        assert_eq!(Value::from(raw.clone()).to_json(), raw);
    }

    #[test]
    fn test_node_identity() {
        let a = Document::new();
        let b = Document::new();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }
}
