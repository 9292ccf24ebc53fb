use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::id::DocumentId;
use crate::value::{NodeId, PathStep, Value};

/// A schema-validated record with a stable id.
///
/// Field values always hold whatever their validator produced; nested nodes
/// are referenced by id through [`Value::Node`].
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    kind: String,
    fields: IndexMap<String, Value>,
    owner: Option<DocumentId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: String, fields: IndexMap<String, Value>) -> Self {
        Self {
            id,
            kind,
            fields,
            owner: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Document whose arena holds this node; `None` once detached.
    pub fn owner(&self) -> Option<DocumentId> {
        self.owner
    }

    /// Value at `path`; the first step names a field.
    pub fn value_at(&self, path: &[PathStep]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get(first.as_key()?)?;
        for step in rest {
            current = current.get(step)?;
        }
        Some(current)
    }

    pub(crate) fn value_at_mut(&mut self, path: &[PathStep]) -> Option<&mut Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.fields.get_mut(first.as_key()?)?;
        for step in rest {
            current = current.get_mut(step)?;
        }
        Some(current)
    }

    pub(crate) fn fields_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.fields
    }

    pub(crate) fn set_owner(&mut self, owner: Option<DocumentId>) {
        self.owner = owner;
    }

    /// Ids referenced directly by this node's fields, in field order.
    pub fn refs(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_refs(&mut out);
        }
        out
    }

    /// Flat record: `id`, `type`, then every field with nested nodes as
    /// `{"ref": id}`.
    pub fn to_record(&self) -> serde_json::Map<String, JsonValue> {
        let mut record = serde_json::Map::with_capacity(self.fields.len() + 2);
        record.insert("id".to_owned(), JsonValue::String(self.id.as_str().to_owned()));
        record.insert("type".to_owned(), JsonValue::String(self.kind.clone()));
        for (name, value) in &self.fields {
            record.insert(name.clone(), value.to_json());
        }
        record
    }
}
