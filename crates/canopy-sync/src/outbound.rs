//! Local change batches to CRDT operations.

use canopy_types::{Change, ChangeOp, Document, NodeId, PathStep, Target, Value};
use indexmap::IndexSet;
use yrs::{Array, ArrayRef, Map, MapRef, Out, TransactionMut};

use crate::convert::{empty_map, pointer_id, record_to_in, value_to_in};
use crate::snapshot::{types_map, TYPES_KEY};

/// Node ids gained and lost by one flushed batch.
#[derive(Debug, Default)]
pub(crate) struct GcBatch {
    inserted: IndexSet<NodeId>,
    removed: IndexSet<NodeId>,
}

/// Translate one change into CRDT operations. Changes whose container has
/// no CRDT counterpart yet are dropped: the node's record is written from
/// the arena when it becomes reachable, which carries the current value.
pub(crate) fn apply_change(
    txn: &mut TransactionMut,
    doc_map: &MapRef,
    doc: &Document,
    change: &Change,
    gc: &mut GcBatch,
) {
    let Some(container) = resolve(txn, doc_map, change) else {
        tracing::debug!(node = ?change.target, path = ?change.path, "no crdt container; dropping change");
        return;
    };
    let applied = match (&change.op, container) {
        (
            ChangeOp::Add { key, new_value } | ChangeOp::Update { key, new_value, .. },
            Out::YMap(map),
        ) => {
            map.insert(txn, key.as_str(), value_to_in(new_value));
            true
        }
        (ChangeOp::Delete { key, .. }, Out::YMap(map)) => {
            map.remove(txn, key);
            true
        }
        (
            ChangeOp::Splice {
                index,
                removed_count,
                added,
                ..
            },
            Out::YArray(array),
        ) => splice(txn, &array, *index, *removed_count, added),
        (ChangeOp::Replace { index, new_value, .. }, Out::YArray(array)) => {
            splice(txn, &array, *index, 1, std::slice::from_ref(new_value))
        }
        (op, _) => {
            tracing::warn!(node = ?change.target, ?op, "crdt container does not match change");
            false
        }
    };
    if applied {
        gc.inserted.extend(doc.reachable_from(change.written()));
        gc.removed.extend(doc.reachable_from(change.dropped()));
    }
}

fn splice(txn: &mut TransactionMut, array: &ArrayRef, index: usize, remove: usize, added: &[Value]) -> bool {
    let len = array.len(&*txn) as usize;
    if index > len || remove > len - index {
        tracing::warn!(index, remove, len, "splice out of range in crdt array; dropping change");
        return false;
    }
    let (Ok(at), Ok(count)) = (u32::try_from(index), u32::try_from(remove)) else {
        return false;
    };
    if count > 0 {
        array.remove_range(txn, at, count);
    }
    for (offset, value) in (at..).zip(added) {
        array.insert(txn, offset, value_to_in(value));
    }
    true
}

/// CRDT container addressed by a change: the top-level map for root
/// changes, otherwise the node's record walked along `path`.
fn resolve(txn: &TransactionMut, doc_map: &MapRef, change: &Change) -> Option<Out> {
    let id = match &change.target {
        Target::Root => return Some(Out::YMap(doc_map.clone())),
        Target::Node(id) => id,
    };
    let types = types_map(txn, doc_map)?;
    let mut current = types.get(txn, id.as_str())?;
    for step in &change.path {
        current = match (current, step) {
            (Out::YMap(map), PathStep::Key(key)) => map.get(txn, key)?,
            (Out::YArray(array), PathStep::Index(index)) => array.get(txn, u32::try_from(*index).ok()?)?,
            _ => return None,
        };
        current = redirect(txn, &types, current)?;
    }
    Some(current)
}

/// Follow a `{$$typeId}` pointer to the referenced record.
fn redirect(txn: &TransactionMut, types: &MapRef, out: Out) -> Option<Out> {
    match &out {
        Out::YMap(map) => match pointer_id(txn, map) {
            Some(id) => types.get(txn, id.as_str()),
            None => Some(out),
        },
        _ => Some(out),
    }
}

impl GcBatch {
    /// Reconcile the `types` table with what the batch attached and
    /// detached. Ids on both sides cancel out; newly reachable nodes get
    /// records read from the arena now; detached nodes lose theirs unless
    /// the root still reaches them.
    pub(crate) fn commit(self, txn: &mut TransactionMut, doc_map: &MapRef, doc: &Document, collect_unreachable: bool) {
        if self.inserted.is_empty() && self.removed.is_empty() {
            return;
        }
        let live = doc.reachable();
        let types = match types_map(&*txn, doc_map) {
            Some(types) => types,
            None => doc_map.insert(txn, TYPES_KEY, empty_map()),
        };

        let seeds: Vec<Value> = self
            .inserted
            .iter()
            .filter(|id| !self.removed.contains(*id) || live.contains(*id))
            .map(|id| Value::Node(id.clone()))
            .collect();
        let mut written = 0usize;
        for id in doc.reachable_from(&seeds) {
            if types.contains_key(&*txn, id.as_str()) {
                continue;
            }
            let Some(node) = doc.node(&id) else {
                tracing::warn!(%id, "referenced node is missing from the arena");
                continue;
            };
            types.insert(txn, id.as_str(), record_to_in(node));
            written += 1;
        }

        let mut deleted = 0usize;
        if collect_unreachable {
            for id in self.removed.iter().filter(|id| !self.inserted.contains(*id)) {
                if live.contains(id) {
                    continue;
                }
                if types.remove(txn, id.as_str()).is_some() {
                    deleted += 1;
                }
            }
        }
        tracing::trace!(written, deleted, "committed crdt record housekeeping");
    }
}
