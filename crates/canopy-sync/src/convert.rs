//! Conversion between canopy JSON and `yrs` values.
//!
//! Node references are `{"ref": id}` on the canopy side and a nested CRDT
//! map `{"$$typeId": id}` on the CRDT side. Everything else maps
//! structurally: objects to CRDT maps, arrays to CRDT arrays, scalars to
//! `Any`.

use std::sync::Arc;

use canopy_types::value::{number_to_json, ref_id, ref_json, NodeId};
use canopy_types::{Node, Value};
use serde_json::{Map as JsonMap, Value as JsonValue};
use yrs::{Any, Array, ArrayPrelim, In, Map, MapPrelim, MapRef, Out, ReadTxn};

/// Key of the CRDT map that encodes a node reference.
pub const TYPE_ID_KEY: &str = "$$typeId";

pub fn json_to_in(json: &JsonValue) -> In {
    match json {
        JsonValue::Null => In::Any(Any::Null),
        JsonValue::Bool(b) => In::Any(Any::Bool(*b)),
        JsonValue::Number(n) => In::Any(Any::Number(n.as_f64().unwrap_or(0.0))),
        JsonValue::String(s) => In::Any(Any::String(Arc::from(s.as_str()))),
        JsonValue::Array(items) => In::Array(items.iter().map(json_to_in).collect::<ArrayPrelim>()),
        JsonValue::Object(map) => match ref_id(map) {
            Some(id) => pointer(id),
            None => In::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_to_in(v)))
                    .collect::<MapPrelim>(),
            ),
        },
    }
}

pub fn value_to_in(value: &Value) -> In {
    json_to_in(&value.to_json())
}

/// CRDT record of a node: `id`, `type` and every field.
pub fn record_to_in(node: &Node) -> In {
    json_to_in(&JsonValue::Object(node.to_record()))
}

pub fn pointer(id: &str) -> In {
    In::Map(MapPrelim::from_iter([(
        TYPE_ID_KEY.to_owned(),
        In::Any(Any::String(Arc::from(id))),
    )]))
}

pub fn empty_map() -> MapPrelim {
    std::iter::empty::<(String, In)>().collect()
}

/// Id inside a `{$$typeId}` pointer map.
pub fn pointer_id<T: ReadTxn>(txn: &T, map: &MapRef) -> Option<NodeId> {
    if map.len(txn) != 1 {
        return None;
    }
    match map.get(txn, TYPE_ID_KEY)? {
        Out::Any(Any::String(id)) => Some(NodeId::from(id.as_ref())),
        _ => None,
    }
}

pub fn out_to_json<T: ReadTxn>(txn: &T, out: &Out) -> JsonValue {
    match out {
        Out::Any(any) => any_to_json(any),
        Out::YArray(array) => JsonValue::Array(array.iter(txn).map(|v| out_to_json(txn, &v)).collect()),
        Out::YMap(map) => match pointer_id(txn, map) {
            Some(id) => ref_json(&id),
            None => {
                let mut object = JsonMap::new();
                for (key, value) in map.iter(txn) {
                    object.insert(key.to_owned(), out_to_json(txn, &value));
                }
                JsonValue::Object(object)
            }
        },
        _ => JsonValue::Null,
    }
}

pub fn any_to_json(any: &Any) -> JsonValue {
    match any {
        Any::Null | Any::Undefined => JsonValue::Null,
        Any::Bool(b) => JsonValue::Bool(*b),
        Any::Number(n) => number_to_json(*n),
        Any::BigInt(n) => JsonValue::from(*n),
        Any::String(s) => JsonValue::String(s.to_string()),
        Any::Buffer(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
        Any::Array(items) => JsonValue::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => {
            if map.len() == 1 {
                if let Some(Any::String(id)) = map.get(TYPE_ID_KEY) {
                    return ref_json(&NodeId::from(id.as_ref()));
                }
            }
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), any_to_json(v))).collect())
        }
    }
}
