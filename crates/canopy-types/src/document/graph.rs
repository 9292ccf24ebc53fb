use indexmap::IndexSet;
use serde_json::Value as JsonValue;

use super::Document;
use crate::error::DocumentError;
use crate::value::{ref_json, NodeId, Value};

impl Document {
    /// Ids reachable from the root, in depth-first preorder.
    pub fn reachable(&self) -> IndexSet<NodeId> {
        match &self.root {
            Some(root) => self.reachable_from([&Value::Node(root.clone())]),
            None => IndexSet::new(),
        }
    }

    /// Ids referenced by `values`, directly or through other nodes. Direct
    /// references are included even when the arena no longer holds them.
    pub fn reachable_from<'v>(&self, values: impl IntoIterator<Item = &'v Value>) -> IndexSet<NodeId> {
        let mut seen = IndexSet::new();
        let mut stack = Vec::new();
        for value in values {
            let mut refs = Vec::new();
            value.collect_refs(&mut refs);
            stack.extend(refs.into_iter().rev());
            while let Some(id) = stack.pop() {
                if !seen.insert(id.clone()) {
                    continue;
                }
                if let Some(node) = self.arena.get(id.as_str()) {
                    stack.extend(node.refs().into_iter().rev());
                }
            }
        }
        seen
    }

    /// Drop every node unreachable from the root. Without a root nothing is
    /// collected. Returns the removed ids.
    pub fn collect_garbage(&mut self) -> Vec<NodeId> {
        if self.root.is_none() {
            return Vec::new();
        }
        let live = self.reachable();
        let dead: Vec<NodeId> = self.arena.ids().filter(|id| !live.contains(*id)).cloned().collect();
        self.arena.retain(|id| live.contains(id));
        if !dead.is_empty() {
            tracing::debug!(document = %self.id, removed = dead.len(), "collected unreachable nodes");
        }
        dead
    }

    /// Nested JSON rendering of the root: nodes are expanded in place, and
    /// references back into the current path render as `{"ref": id}`.
    pub fn view(&self) -> Result<JsonValue, DocumentError> {
        let root = self.root.as_ref().ok_or(DocumentError::NoRoot)?;
        let mut path = Vec::new();
        Ok(self.view_node(root, &mut path))
    }

    fn view_node(&self, id: &NodeId, path: &mut Vec<NodeId>) -> JsonValue {
        let Some(node) = self.arena.get(id.as_str()) else {
            return ref_json(id);
        };
        if path.contains(id) {
            return ref_json(id);
        }
        path.push(id.clone());
        let mut out = serde_json::Map::with_capacity(node.fields().len() + 2);
        out.insert("id".to_owned(), JsonValue::String(id.as_str().to_owned()));
        out.insert("type".to_owned(), JsonValue::String(node.kind().to_owned()));
        for (name, value) in node.fields() {
            out.insert(name.clone(), self.view_value(value, path));
        }
        path.pop();
        JsonValue::Object(out)
    }

    fn view_value(&self, value: &Value, path: &mut Vec<NodeId>) -> JsonValue {
        match value {
            Value::Node(id) => self.view_node(id, path),
            Value::Array(items) => JsonValue::Array(items.iter().map(|v| self.view_value(v, path)).collect()),
            Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.view_value(v, path)))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }
}
