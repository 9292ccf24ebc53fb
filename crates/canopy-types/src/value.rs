//! Field values stored on nodes.
//!
//! [`Value`] is the tagged union every schema field holds. Nested nodes are
//! never embedded: a field that points at another node stores
//! [`Value::Node`] with the target's id, and the node itself lives in the
//! owning document's arena.

use std::borrow::Borrow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Key of the single-entry JSON object that encodes a node reference.
pub const REF_KEY: &str = "ref";

/// Largest integer an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Globally unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// One step inside a node's field values. The first step of a path names a
/// field; later steps index into arrays and maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key(key.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    Node(NodeId),
}

impl Value {
    /// Convert a JSON value. A single-key object `{"ref": "<id>"}` becomes a
    /// node reference; every other object becomes a map.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => Self::String(s.clone()),
            JsonValue::Array(items) => Self::Array(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => match ref_id(map) {
                Some(id) => Self::Node(NodeId::from(id)),
                None => Self::Map(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Self::from_json(v)))
                        .collect(),
                ),
            },
        }
    }

    /// Inverse of [`Value::from_json`]; node references become `{"ref": id}`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Node(id) => ref_json(id),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Node(_) => "node",
        }
    }

    /// Short human-readable rendering used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Node(id) => format!("node {id}"),
            Self::Map(map) => match map.get("type") {
                Some(Self::String(kind)) => format!("map of type {kind}"),
                _ => "map".to_owned(),
            },
            Self::Array(items) => format!("array of {}", items.len()),
            other => other.to_json().to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            Self::Node(id) => Some(id),
            _ => None,
        }
    }

    /// Child value one step down, if the step matches this value's shape.
    pub fn get(&self, step: &PathStep) -> Option<&Value> {
        match (self, step) {
            (Self::Map(map), PathStep::Key(key)) => map.get(key),
            (Self::Array(items), PathStep::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, step: &PathStep) -> Option<&mut Value> {
        match (self, step) {
            (Self::Map(map), PathStep::Key(key)) => map.get_mut(key),
            (Self::Array(items), PathStep::Index(index)) => items.get_mut(*index),
            _ => None,
        }
    }

    /// Append every node id referenced directly by this value (not through
    /// other nodes) to `out`, in traversal order.
    pub fn collect_refs(&self, out: &mut Vec<NodeId>) {
        match self {
            Self::Node(id) => out.push(id.clone()),
            Self::Array(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_refs(out)),
            _ => {}
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(&json)
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Self::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<&NodeId> for Value {
    fn from(id: &NodeId) -> Self {
        Self::Node(id.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

/// `{"ref": id}`.
pub fn ref_json(id: &NodeId) -> JsonValue {
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(REF_KEY.to_owned(), JsonValue::String(id.as_str().to_owned()));
    JsonValue::Object(map)
}

/// The id inside a `{"ref": id}` object, if `map` is exactly that.
pub fn ref_id(map: &serde_json::Map<String, JsonValue>) -> Option<&str> {
    if map.len() != 1 {
        return None;
    }
    map.get(REF_KEY).and_then(JsonValue::as_str)
}

/// Append the ids of every `{"ref": id}` object nested in `json`.
pub fn collect_json_refs(json: &JsonValue, out: &mut Vec<NodeId>) {
    match json {
        JsonValue::Array(items) => items.iter().for_each(|v| collect_json_refs(v, out)),
        JsonValue::Object(map) => match ref_id(map) {
            Some(id) => out.push(NodeId::from(id)),
            None => map.values().for_each(|v| collect_json_refs(v, out)),
        },
        _ => {}
    }
}

/// Whole finite numbers serialize as integers so JSON round-trips stay stable.
pub fn number_to_json(n: f64) -> JsonValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}
