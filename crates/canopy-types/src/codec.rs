//! Flat id-addressed form of a document graph.
//!
//! ```text
//! { "root": { "ref": "<id>" },
//!   "types": { "<id>": { "id": "<id>", "type": "<kind>", ...fields } } }
//! ```
//!
//! Nested nodes never appear inline; every reference is `{"ref": id}` and
//! resolves inside `types`. Cycles and shared nodes are therefore plain data.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::arena::Arena;
use crate::build::BuildCtx;
use crate::document::Document;
use crate::error::CodecError;
use crate::id::IdGenerator;
use crate::node::Node;
use crate::schema::SchemaRegistry;
use crate::value::{collect_json_refs, NodeId, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "ref")]
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedGraph {
    pub root: NodeRef,
    pub types: IndexMap<NodeId, JsonMap<String, JsonValue>>,
}

impl FlattenedGraph {
    pub fn from_json(json: &JsonValue) -> Result<Self, CodecError> {
        Ok(Self::deserialize(json)?)
    }

    pub fn to_json(&self) -> JsonValue {
        let mut types = JsonMap::with_capacity(self.types.len());
        for (id, record) in &self.types {
            types.insert(id.as_str().to_owned(), JsonValue::Object(record.clone()));
        }
        let mut out = JsonMap::with_capacity(2);
        out.insert("root".to_owned(), crate::value::ref_json(&self.root.id));
        out.insert("types".to_owned(), JsonValue::Object(types));
        JsonValue::Object(out)
    }

    /// Whether `json` has the `{root, types}` shape rather than being a
    /// nested node.
    pub fn is_flattened(json: &JsonValue) -> bool {
        json.as_object().is_some_and(|map| {
            map.len() == 2
                && map.get("root").is_some_and(JsonValue::is_object)
                && map.get("types").is_some_and(JsonValue::is_object)
        })
    }
}

/// Depth-first preorder walk from `root`; each reachable node is recorded
/// once.
pub fn flatten(doc: &Document, root: &NodeId) -> Result<FlattenedGraph, CodecError> {
    let mut types = IndexMap::new();
    let mut stack = vec![root.clone()];
    while let Some(id) = stack.pop() {
        if types.contains_key(&id) {
            continue;
        }
        let node = doc
            .node(&id)
            .ok_or_else(|| CodecError::UnresolvedReference(id.clone()))?;
        stack.extend(node.refs().into_iter().rev());
        types.insert(id, node.to_record());
    }
    Ok(FlattenedGraph {
        root: NodeRef { id: root.clone() },
        types,
    })
}

pub fn unflatten(graph: &FlattenedGraph, registry: Arc<SchemaRegistry>) -> Result<Document, CodecError> {
    let mut doc = Document::new(registry);
    doc.load(graph)?;
    Ok(doc)
}

/// Construct every record as a node staged against `target`. Kinds are
/// declared before anything is built so records may reference each other
/// in any order.
pub(crate) fn build_records(
    registry: &SchemaRegistry,
    target: &Arena,
    ids: &mut IdGenerator,
    records: &IndexMap<NodeId, JsonMap<String, JsonValue>>,
) -> Result<IndexMap<NodeId, Node>, CodecError> {
    let mut ctx = BuildCtx::new(registry, target, ids);
    for (id, record) in records {
        let kind = record
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CodecError::MissingKind(id.to_string()))?;
        if let Some(JsonValue::String(inner)) = record.get("id") {
            if inner != id.as_str() {
                return Err(CodecError::MalformedRecord {
                    id: id.to_string(),
                    reason: format!("record carries id {inner}"),
                });
            }
        }
        let schema = registry.get(kind)?;
        ctx.declare(id.clone(), schema.kind().to_owned());
    }
    for record in records.values() {
        let mut refs = Vec::new();
        for (key, value) in record {
            if key != "id" && key != "type" {
                collect_json_refs(value, &mut refs);
            }
        }
        if let Some(missing) = refs.into_iter().find(|r| ctx.kind_of(r).is_none()) {
            return Err(CodecError::UnresolvedReference(missing));
        }
    }
    for (id, record) in records {
        let mut raw = Value::from_json(&JsonValue::Object(record.clone()));
        if let Value::Map(map) = &mut raw {
            map.insert("id".to_owned(), Value::String(id.as_str().to_owned()));
        }
        let kind = record.get("type").and_then(JsonValue::as_str).unwrap_or_default();
        ctx.construct(kind, &raw)?;
    }
    Ok(ctx.finish())
}

impl Document {
    /// Replace this document's content with `graph`. The root slot change is
    /// recorded like any other mutation.
    pub fn load(&mut self, graph: &FlattenedGraph) -> Result<(), CodecError> {
        if !graph.types.contains_key(&graph.root.id) {
            return Err(CodecError::UnresolvedReference(graph.root.id.clone()));
        }
        let registry = Arc::clone(&self.registry);
        let staged = build_records(&registry, &Arena::default(), &mut self.ids, &graph.types)?;
        self.arena.clear();
        self.commit(staged);
        self.set_root(&graph.root.id)?;
        Ok(())
    }

    pub fn from_flattened(registry: Arc<SchemaRegistry>, graph: &FlattenedGraph) -> Result<Self, CodecError> {
        unflatten(graph, registry)
    }

    /// Accepts either a flattened graph or a single nested node description
    /// (`{"type": ..., ...}` with inline children).
    pub fn from_json(registry: Arc<SchemaRegistry>, json: &JsonValue) -> Result<Self, CodecError> {
        if FlattenedGraph::is_flattened(json) {
            return unflatten(&FlattenedGraph::from_json(json)?, registry);
        }
        let kind = json
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| CodecError::MissingKind("<root>".to_owned()))?;
        let mut doc = Document::new(registry);
        let root = doc.create(kind, Value::from_json(json))?;
        doc.set_root(&root)?;
        Ok(doc)
    }

    pub fn to_flattened(&self) -> Result<FlattenedGraph, CodecError> {
        let root = self.root.as_ref().ok_or(CodecError::NoRoot)?;
        flatten(self, root)
    }

    /// Construct nodes from flat records into this arena. References may
    /// point at other records or at nodes already present. Nothing is
    /// inserted if any record fails.
    pub fn materialize_records(
        &mut self,
        records: &IndexMap<NodeId, JsonMap<String, JsonValue>>,
    ) -> Result<Vec<NodeId>, CodecError> {
        let registry = Arc::clone(&self.registry);
        let staged = build_records(&registry, &self.arena, &mut self.ids, records)?;
        let ids = staged.keys().cloned().collect();
        self.commit(staged);
        Ok(ids)
    }
}
