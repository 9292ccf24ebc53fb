//! The document arena and its mutation API.
//!
//! A [`Document`] owns every node of one logical tree. All writes go
//! through methods here so each one is validated against the schema and
//! recorded as a [`Change`]; listeners registered with
//! [`Document::on_change`] receive those changes in batches.

mod change;
mod graph;
mod transaction;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::arena::Arena;
use crate::build::BuildCtx;
use crate::error::DocumentError;
use crate::id::{DocumentId, IdGenerator};
use crate::node::Node;
use crate::schema::SchemaRegistry;
use crate::validator::Validator;
use crate::value::{NodeId, PathStep, Value};

pub use change::{Change, ChangeBatch, ChangeOp, ChangeOrigin, Target};
pub use transaction::Transaction;

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&Document, &ChangeBatch)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloneOptions {
    /// Assign fresh ids to the copy and everything nested in it.
    pub replace_ids: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self { replace_ids: true }
    }
}

pub struct Document {
    pub(crate) id: DocumentId,
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) arena: Arena,
    pub(crate) root: Option<NodeId>,
    pub(crate) ids: IdGenerator,
    next_listener_id: ListenerId,
    listeners: BTreeMap<ListenerId, Listener>,
    pending: Vec<Change>,
    depth: usize,
    batch_origin: ChangeOrigin,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("nodes", &self.arena.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Document {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            id: DocumentId::next(),
            registry,
            arena: Arena::default(),
            root: None,
            ids: IdGenerator::default(),
            next_listener_id: 1,
            listeners: BTreeMap::new(),
            pending: Vec::new(),
            depth: 0,
            batch_origin: ChangeOrigin::Local,
        }
    }

    /// A document whose generated ids are reproducible from `seed`.
    pub fn with_id_seed(registry: Arc<SchemaRegistry>, seed: u64) -> Self {
        let mut doc = Self::new(registry);
        doc.ids = IdGenerator::seeded(seed);
        doc
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.arena.get(id.as_str())
    }

    pub fn get(&self, id: &NodeId, field: &str) -> Option<&Value> {
        self.node(id)?.get(field)
    }

    pub fn value_at(&self, id: &NodeId, path: &[PathStep]) -> Option<&Value> {
        self.node(id)?.value_at(path)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.arena.contains(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.arena.nodes()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.arena.ids()
    }

    // ----------------------------------------------------------- construction

    /// Construct a node of `kind` (and any nested inline nodes). The node is
    /// owned by this document but unreachable until something references it.
    pub fn create(&mut self, kind: &str, raw: impl Into<Value>) -> Result<NodeId, DocumentError> {
        let raw = raw.into();
        let registry = Arc::clone(&self.registry);
        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids);
        let id = ctx.construct(kind, &raw)?;
        let staged = ctx.finish();
        self.commit(staged);
        Ok(id)
    }

    /// Deep-copy a node of this document through its validators.
    pub fn clone_node(&mut self, id: &NodeId, options: CloneOptions) -> Result<NodeId, DocumentError> {
        if !self.contains(id) {
            return Err(DocumentError::UnknownNode(id.clone()));
        }
        let registry = Arc::clone(&self.registry);
        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids)
            .with_source(&self.arena, options.replace_ids);
        let copy = ctx.clone_node(id)?;
        let staged = ctx.finish();
        self.commit(staged);
        Ok(copy)
    }

    /// Copy the subgraph under `id` out of another document.
    pub fn import(
        &mut self,
        source: &Document,
        id: &NodeId,
        options: CloneOptions,
    ) -> Result<NodeId, DocumentError> {
        if !source.contains(id) {
            return Err(DocumentError::UnknownNode(id.clone()));
        }
        let registry = Arc::clone(&self.registry);
        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids)
            .with_source(&source.arena, options.replace_ids);
        let copy = ctx.clone_node(id)?;
        let staged = ctx.finish();
        self.commit(staged);
        Ok(copy)
    }

    /// Remove an unreachable node from the arena and hand it back detached.
    pub fn detach(&mut self, id: &NodeId) -> Result<Node, DocumentError> {
        if !self.contains(id) {
            return Err(DocumentError::UnknownNode(id.clone()));
        }
        if self.reachable().contains(id) {
            return Err(DocumentError::NodeInUse(id.clone()));
        }
        let mut node = self
            .arena
            .remove(id.as_str())
            .ok_or_else(|| DocumentError::UnknownNode(id.clone()))?;
        node.set_owner(None);
        Ok(node)
    }

    /// Re-validate a detached node against this document and insert it.
    pub fn adopt(&mut self, node: Node) -> Result<NodeId, DocumentError> {
        if let Some(owner) = node.owner().filter(|owner| *owner != self.id) {
            return Err(DocumentError::CrossTreeReuse {
                id: node.id().clone(),
                owner,
            });
        }
        let mut raw = IndexMap::with_capacity(node.fields().len() + 1);
        raw.insert("id".to_owned(), Value::String(node.id().as_str().to_owned()));
        for (name, value) in node.fields() {
            raw.insert(name.clone(), value.clone());
        }
        self.create(node.kind(), Value::Map(raw))
    }

    pub(crate) fn commit(&mut self, staged: IndexMap<NodeId, Node>) {
        for (_, mut node) in staged {
            node.set_owner(Some(self.id));
            self.arena.insert(node);
        }
    }

    // -------------------------------------------------------------- mutation

    pub fn set_root(&mut self, id: &NodeId) -> Result<(), DocumentError> {
        if !self.contains(id) {
            return Err(DocumentError::UnknownNode(id.clone()));
        }
        let new_value = Value::Node(id.clone());
        let op = match self.root.replace(id.clone()) {
            Some(old) if &old == id => return Ok(()),
            Some(old) => ChangeOp::Update {
                key: "root".to_owned(),
                old_value: Value::Node(old),
                new_value,
            },
            None => ChangeOp::Add {
                key: "root".to_owned(),
                new_value,
            },
        };
        self.record(Change {
            target: Target::Root,
            path: Vec::new(),
            op,
        });
        Ok(())
    }

    /// Assign a field of a node.
    pub fn set(&mut self, id: &NodeId, field: &str, value: impl Into<Value>) -> Result<(), DocumentError> {
        self.map_set(id, &[], field, value)
    }

    /// Assign `key` in the map at `path` (the node's field table when `path`
    /// is empty).
    pub fn map_set(
        &mut self,
        id: &NodeId,
        path: &[PathStep],
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), DocumentError> {
        let value = value.into();
        let registry = Arc::clone(&self.registry);
        let node = lookup(&self.arena, id)?;
        let schema = registry.get(node.kind())?;
        let kind = schema.kind();

        let (validator, current) = if path.is_empty() {
            let field = schema.field(key).ok_or_else(|| DocumentError::UnknownField {
                kind: kind.to_owned(),
                field: key.to_owned(),
            })?;
            (&field.validator, node.get(key))
        } else {
            let container = node.value_at(path).ok_or(DocumentError::PathNotFound)?;
            let Value::Map(map) = container else {
                return Err(DocumentError::NotMap);
            };
            let validator = validator_at(&registry, node, path)?
                .entry(key, container)
                .ok_or_else(|| DocumentError::UnknownField {
                    kind: kind.to_owned(),
                    field: key.to_owned(),
                })?;
            (validator, map.get(key))
        };
        let field_name = field_name(path, key);

        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids);
        let new_value = validator
            .get(Some(&value), &mut ctx)
            .map_err(|e| e.in_field(kind, field_name))?;
        if current == Some(&new_value) {
            return Ok(());
        }
        let old_value = current.cloned();
        let staged = ctx.finish();
        self.commit(staged);

        let node = self.node_mut(id)?;
        if path.is_empty() {
            node.fields_mut().insert(key.to_owned(), new_value.clone());
        } else if let Some(Value::Map(map)) = node.value_at_mut(path) {
            map.insert(key.to_owned(), new_value.clone());
        }
        let op = match old_value {
            Some(old_value) => ChangeOp::Update {
                key: key.to_owned(),
                old_value,
                new_value,
            },
            None => ChangeOp::Add {
                key: key.to_owned(),
                new_value,
            },
        };
        self.record(Change {
            target: Target::Node(id.clone()),
            path: path.to_vec(),
            op,
        });
        Ok(())
    }

    /// Remove `key` from the map at `path`. Schema fields themselves cannot
    /// be deleted, nor can required entries of a model.
    pub fn map_delete(&mut self, id: &NodeId, path: &[PathStep], key: &str) -> Result<Value, DocumentError> {
        let registry = Arc::clone(&self.registry);
        let node = self.node_ref(id)?;
        let kind = node.kind().to_owned();
        if path.is_empty() {
            return Err(DocumentError::FieldDeletion {
                kind,
                field: key.to_owned(),
            });
        }
        let container = node.value_at(path).ok_or(DocumentError::PathNotFound)?;
        let Value::Map(map) = container else {
            return Err(DocumentError::NotMap);
        };
        if !map.contains_key(key) {
            return Err(DocumentError::PathNotFound);
        }
        let container_validator = validator_at(&registry, node, path)?.unwrap_for(container);
        if let Validator::Model(fields) = container_validator {
            if fields.get(key).is_some_and(|v| !v.accepts_missing()) {
                return Err(DocumentError::FieldDeletion {
                    kind,
                    field: key.to_owned(),
                });
            }
        }

        let node = self.node_mut(id)?;
        let Some(Value::Map(map)) = node.value_at_mut(path) else {
            return Err(DocumentError::NotMap);
        };
        let old_value = map.shift_remove(key).ok_or(DocumentError::PathNotFound)?;
        self.record(Change {
            target: Target::Node(id.clone()),
            path: path.to_vec(),
            op: ChangeOp::Delete {
                key: key.to_owned(),
                old_value: old_value.clone(),
            },
        });
        Ok(old_value)
    }

    /// Remove `remove` items at `index` from the array at `path` and insert
    /// `insert` in their place. Returns the removed items.
    pub fn splice(
        &mut self,
        id: &NodeId,
        path: &[PathStep],
        index: usize,
        remove: usize,
        insert: Vec<Value>,
    ) -> Result<Vec<Value>, DocumentError> {
        let registry = Arc::clone(&self.registry);
        let node = lookup(&self.arena, id)?;
        let kind = node.kind().to_owned();
        let container = node.value_at(path).ok_or(DocumentError::PathNotFound)?;
        let Value::Array(items) = container else {
            return Err(DocumentError::NotArray);
        };
        let len = items.len();
        if index > len {
            return Err(DocumentError::IndexOutOfBounds { index, len });
        }
        if remove > len - index {
            return Err(DocumentError::IndexOutOfBounds {
                index: index.saturating_add(remove),
                len,
            });
        }
        if remove == 0 && insert.is_empty() {
            return Ok(Vec::new());
        }
        let item = validator_at(&registry, node, path)?
            .item(container)
            .ok_or(DocumentError::NotArray)?;
        let field_name = field_name(path, "");

        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids);
        let mut added = Vec::with_capacity(insert.len());
        for value in &insert {
            added.push(
                item.get(Some(value), &mut ctx)
                    .map_err(|e| e.in_field(&kind, field_name))?,
            );
        }
        let staged = ctx.finish();
        self.commit(staged);

        let node = self.node_mut(id)?;
        let Some(Value::Array(items)) = node.value_at_mut(path) else {
            return Err(DocumentError::NotArray);
        };
        let removed: Vec<Value> = items.splice(index..index + remove, added.iter().cloned()).collect();
        self.record(Change {
            target: Target::Node(id.clone()),
            path: path.to_vec(),
            op: ChangeOp::Splice {
                index,
                removed_count: remove,
                added,
                removed: removed.clone(),
            },
        });
        Ok(removed)
    }

    pub fn push(&mut self, id: &NodeId, path: &[PathStep], value: impl Into<Value>) -> Result<(), DocumentError> {
        let len = self.array_len(id, path)?;
        self.splice(id, path, len, 0, vec![value.into()]).map(drop)
    }

    pub fn insert(
        &mut self,
        id: &NodeId,
        path: &[PathStep],
        index: usize,
        value: impl Into<Value>,
    ) -> Result<(), DocumentError> {
        self.splice(id, path, index, 0, vec![value.into()]).map(drop)
    }

    pub fn remove(&mut self, id: &NodeId, path: &[PathStep], index: usize) -> Result<Value, DocumentError> {
        let mut removed = self.splice(id, path, index, 1, Vec::new())?;
        removed.pop().ok_or(DocumentError::IndexOutOfBounds { index, len: 0 })
    }

    /// Overwrite one array slot. Returns the previous value.
    pub fn replace_at(
        &mut self,
        id: &NodeId,
        path: &[PathStep],
        index: usize,
        value: impl Into<Value>,
    ) -> Result<Value, DocumentError> {
        let value = value.into();
        let registry = Arc::clone(&self.registry);
        let node = lookup(&self.arena, id)?;
        let kind = node.kind().to_owned();
        let container = node.value_at(path).ok_or(DocumentError::PathNotFound)?;
        let Value::Array(items) = container else {
            return Err(DocumentError::NotArray);
        };
        let current = items.get(index).ok_or(DocumentError::IndexOutOfBounds {
            index,
            len: items.len(),
        })?;
        let item = validator_at(&registry, node, path)?
            .item(container)
            .ok_or(DocumentError::NotArray)?;
        let field_name = field_name(path, "");

        let mut ctx = BuildCtx::new(&registry, &self.arena, &mut self.ids);
        let new_value = item
            .get(Some(&value), &mut ctx)
            .map_err(|e| e.in_field(&kind, field_name))?;
        if current == &new_value {
            return Ok(new_value);
        }
        let staged = ctx.finish();
        self.commit(staged);

        let node = self.node_mut(id)?;
        let Some(slot) = node.value_at_mut(path).and_then(|v| v.get_mut(&PathStep::Index(index))) else {
            return Err(DocumentError::PathNotFound);
        };
        let old_value = std::mem::replace(slot, new_value.clone());
        self.record(Change {
            target: Target::Node(id.clone()),
            path: path.to_vec(),
            op: ChangeOp::Replace {
                index,
                old_value: old_value.clone(),
                new_value,
            },
        });
        Ok(old_value)
    }

    fn array_len(&self, id: &NodeId, path: &[PathStep]) -> Result<usize, DocumentError> {
        match self.node_ref(id)?.value_at(path) {
            Some(Value::Array(items)) => Ok(items.len()),
            Some(_) => Err(DocumentError::NotArray),
            None => Err(DocumentError::PathNotFound),
        }
    }

    fn node_ref(&self, id: &NodeId) -> Result<&Node, DocumentError> {
        lookup(&self.arena, id)
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node, DocumentError> {
        self.arena
            .get_mut(id.as_str())
            .ok_or_else(|| DocumentError::UnknownNode(id.clone()))
    }

    // ------------------------------------------------------------- listeners

    pub fn on_change<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&Document, &ChangeBatch) + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.saturating_add(1);
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, listener_id: ListenerId) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    pub(crate) fn begin_batch(&mut self, origin: Option<ChangeOrigin>) {
        if self.depth == 0 {
            self.batch_origin = origin.unwrap_or_default();
        }
        self.depth += 1;
    }

    pub(crate) fn end_batch(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 && !self.pending.is_empty() {
            let batch = ChangeBatch {
                origin: self.batch_origin,
                changes: std::mem::take(&mut self.pending),
            };
            self.emit(&batch);
        }
    }

    fn record(&mut self, change: Change) {
        self.pending.push(change);
        if self.depth == 0 {
            self.begin_batch(None);
            self.end_batch();
        }
    }

    fn emit(&mut self, batch: &ChangeBatch) {
        tracing::trace!(
            document = %self.id,
            origin = ?batch.origin,
            changes = batch.changes.len(),
            "emitting change batch"
        );
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in listeners.values_mut() {
            listener(self, batch);
        }
        self.listeners = listeners;
    }
}

fn lookup<'d>(arena: &'d Arena, id: &NodeId) -> Result<&'d Node, DocumentError> {
    arena
        .get(id.as_str())
        .ok_or_else(|| DocumentError::UnknownNode(id.clone()))
}

/// Validator governing the value at `path` inside `node`.
fn validator_at<'r>(
    registry: &'r SchemaRegistry,
    node: &Node,
    path: &[PathStep],
) -> Result<&'r Validator, DocumentError> {
    let schema = registry.get(node.kind())?;
    let (first, rest) = path.split_first().ok_or(DocumentError::PathNotFound)?;
    let name = first.as_key().ok_or(DocumentError::PathNotFound)?;
    let field = schema.field(name).ok_or_else(|| DocumentError::UnknownField {
        kind: node.kind().to_owned(),
        field: name.to_owned(),
    })?;
    let mut validator = &field.validator;
    let mut value = node.get(name).ok_or(DocumentError::PathNotFound)?;
    for step in rest {
        validator = match step {
            PathStep::Key(key) => validator.entry(key, value),
            PathStep::Index(_) => validator.item(value),
        }
        .ok_or(DocumentError::PathNotFound)?;
        value = value.get(step).ok_or(DocumentError::PathNotFound)?;
    }
    Ok(validator)
}

/// Field name reported in violations: the first path step, or `key` for
/// direct field writes.
fn field_name<'p>(path: &'p [PathStep], key: &'p str) -> &'p str {
    path.first().and_then(PathStep::as_key).unwrap_or(key)
}
