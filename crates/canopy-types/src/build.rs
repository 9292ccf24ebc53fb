//! Staged node construction.
//!
//! A [`BuildCtx`] runs validators against a document's arena without
//! touching it: every node produced by a construction or clone is staged and
//! only handed back by [`BuildCtx::finish`]. A failing build is simply
//! dropped, so no partially-built node ever reaches an arena.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::arena::Arena;
use crate::error::{DocumentError, SchemaViolation};
use crate::id::{is_valid_id, IdGenerator};
use crate::node::Node;
use crate::schema::SchemaRegistry;
use crate::value::{NodeId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildMode {
    Construct,
    /// Node references are deep-copied out of the source arena.
    Clone { replace_ids: bool },
}

/// Build state to restore when a union branch is abandoned.
pub(crate) struct Checkpoint {
    staged: usize,
    known: HashMap<NodeId, String>,
    cloned: HashMap<NodeId, NodeId>,
}

pub(crate) struct BuildCtx<'a> {
    registry: &'a SchemaRegistry,
    target: &'a Arena,
    source: &'a Arena,
    ids: &'a mut IdGenerator,
    mode: BuildMode,
    known: HashMap<NodeId, String>,
    cloned: HashMap<NodeId, NodeId>,
    staged: IndexMap<NodeId, Node>,
}

impl<'a> BuildCtx<'a> {
    pub fn new(registry: &'a SchemaRegistry, target: &'a Arena, ids: &'a mut IdGenerator) -> Self {
        Self {
            registry,
            target,
            source: target,
            ids,
            mode: BuildMode::Construct,
            known: HashMap::new(),
            cloned: HashMap::new(),
            staged: IndexMap::new(),
        }
    }

    /// Clone out of `source` into the target arena.
    pub fn with_source(mut self, source: &'a Arena, replace_ids: bool) -> Self {
        self.source = source;
        self.mode = BuildMode::Clone { replace_ids };
        self
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Announce a node that will be constructed later in this build, so
    /// references to it validate before it exists.
    pub fn declare(&mut self, id: NodeId, kind: String) {
        self.known.insert(id, kind);
    }

    /// Kind of the node a raw reference points at. In clone mode raw values
    /// come from the source arena, so references resolve there.
    pub fn kind_of(&self, id: &NodeId) -> Option<&str> {
        if let BuildMode::Clone { .. } = self.mode {
            return self.source.kind_of(id.as_str());
        }
        if let Some(node) = self.staged.get(id) {
            return Some(node.kind());
        }
        if let Some(kind) = self.known.get(id) {
            return Some(kind);
        }
        self.target.kind_of(id.as_str())
    }

    fn claim(&self, id: &NodeId) -> Result<(), DocumentError> {
        if self.staged.contains_key(id) || self.target.contains(id.as_str()) {
            return Err(DocumentError::DuplicateId(id.clone()));
        }
        Ok(())
    }

    /// Construct a node of `kind` from a raw map, recursively constructing
    /// inline nested nodes. Returns the new node's id.
    pub fn construct(&mut self, kind: &str, raw: &Value) -> Result<NodeId, DocumentError> {
        let registry = self.registry;
        let schema = registry.get(kind)?;
        if schema.is_abstract() {
            return Err(DocumentError::AbstractKind(schema.kind().to_owned()));
        }
        let Value::Map(map) = raw else {
            return Err(SchemaViolation {
                kind: schema.kind().to_owned(),
                field: String::new(),
                expected: "map".to_owned(),
                found: raw.describe(),
            }
            .into());
        };
        let id = match (map.get("id"), self.mode) {
            (_, BuildMode::Clone { replace_ids: true }) | (None | Some(Value::Null), _) => {
                self.ids.next_id()
            }
            (Some(Value::String(id)), _) if is_valid_id(id) => NodeId::from(id.as_str()),
            (Some(other), _) => return Err(DocumentError::InvalidId(other.describe())),
        };
        self.claim(&id)?;
        self.declare(id.clone(), schema.kind().to_owned());

        let mut fields = IndexMap::new();
        for field in schema.fields() {
            let value = field
                .validator
                .get(map.get(&field.name), self)
                .map_err(|e| e.in_field(schema.kind(), &field.name))?;
            fields.insert(field.name.clone(), value);
        }
        self.staged
            .insert(id.clone(), Node::new(id.clone(), schema.kind().to_owned(), fields));
        Ok(id)
    }

    /// Deep-copy `source_id` out of the source arena. Each source node is
    /// copied once per build, so shared and cyclic structure is preserved.
    pub fn clone_node(&mut self, source_id: &NodeId) -> Result<NodeId, DocumentError> {
        if let Some(id) = self.cloned.get(source_id) {
            return Ok(id.clone());
        }
        let source = self.source;
        let registry = self.registry;
        let node = source
            .get(source_id.as_str())
            .ok_or_else(|| DocumentError::UnresolvedReference(source_id.clone()))?;
        let schema = registry.get(node.kind())?;
        let replace_ids = matches!(self.mode, BuildMode::Clone { replace_ids: true });
        let id = if replace_ids {
            self.ids.next_id()
        } else {
            source_id.clone()
        };
        self.claim(&id)?;
        self.cloned.insert(source_id.clone(), id.clone());

        let mut fields = IndexMap::new();
        for field in schema.fields() {
            let value = field
                .validator
                .get(node.get(&field.name), self)
                .map_err(|e| e.in_field(schema.kind(), &field.name))?;
            fields.insert(field.name.clone(), value);
        }
        self.staged
            .insert(id.clone(), Node::new(id.clone(), schema.kind().to_owned(), fields));
        Ok(id)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            staged: self.staged.len(),
            known: self.known.clone(),
            cloned: self.cloned.clone(),
        }
    }

    /// Forget everything staged or declared since `checkpoint`. Staged
    /// nodes are only ever appended, so truncation drops exactly those.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.staged.truncate(checkpoint.staged);
        self.known = checkpoint.known;
        self.cloned = checkpoint.cloned;
    }

    pub fn finish(self) -> IndexMap<NodeId, Node> {
        self.staged
    }
}
