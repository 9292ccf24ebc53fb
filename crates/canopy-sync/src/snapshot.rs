//! Whole-graph exchange with the CRDT document: seeding it from a flattened
//! graph and reading a flattened graph back out of it.

use canopy_types::value::collect_json_refs;
use canopy_types::{CodecError, FlattenedGraph, NodeRef};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use yrs::{Map, MapRef, Out, ReadTxn, TransactionMut};

use crate::convert::{json_to_in, out_to_json, pointer, pointer_id};
use crate::error::SyncError;

pub const ROOT_KEY: &str = "root";
pub const TYPES_KEY: &str = "types";

pub fn types_map<T: ReadTxn>(txn: &T, doc_map: &MapRef) -> Option<MapRef> {
    match doc_map.get(txn, TYPES_KEY)? {
        Out::YMap(types) => Some(types),
        _ => None,
    }
}

/// Write `graph` as the CRDT document's `root` and `types`.
pub fn write_graph(txn: &mut TransactionMut, doc_map: &MapRef, graph: &FlattenedGraph) {
    let records = graph
        .types
        .iter()
        .map(|(id, record)| (id.as_str().to_owned(), json_to_in(&JsonValue::Object(record.clone()))))
        .collect::<yrs::MapPrelim>();
    doc_map.insert(txn, TYPES_KEY, yrs::In::Map(records));
    doc_map.insert(txn, ROOT_KEY, pointer(graph.root.id.as_str()));
}

/// Read the CRDT document as a flattened graph. `Ok(None)` when it has no
/// root yet.
pub fn read_graph<T: ReadTxn>(txn: &T, doc_map: &MapRef) -> Result<Option<FlattenedGraph>, SyncError> {
    let root = match doc_map.get(txn, ROOT_KEY) {
        None => return Ok(None),
        Some(Out::YMap(ptr)) => pointer_id(txn, &ptr)
            .ok_or_else(|| SyncError::MalformedDocument("root is not a node pointer".to_owned()))?,
        Some(_) => return Err(SyncError::MalformedDocument("root is not a map".to_owned())),
    };
    let types = types_map(txn, doc_map)
        .ok_or_else(|| SyncError::MalformedDocument("missing types map".to_owned()))?;
    // Only records reachable from the root; stale ones may dangle.
    let mut records = IndexMap::new();
    let mut stack = vec![root.clone()];
    while let Some(id) = stack.pop() {
        if records.contains_key(&id) {
            continue;
        }
        let Some(value) = types.get(txn, id.as_str()) else {
            return Err(SyncError::Codec(CodecError::UnresolvedReference(id)));
        };
        let JsonValue::Object(record) = out_to_json(txn, &value) else {
            return Err(SyncError::MalformedDocument(format!("record {id} is not a map")));
        };
        let mut refs = Vec::new();
        for value in record.values() {
            collect_json_refs(value, &mut refs);
        }
        stack.extend(refs.into_iter().rev());
        records.insert(id, record);
    }
    Ok(Some(FlattenedGraph {
        root: NodeRef { id: root },
        types: records,
    }))
}
