//! Remote CRDT events to local document mutations.

use std::collections::HashSet;

use canopy_types::value::collect_json_refs;
use canopy_types::{ChangeOrigin, CodecError, Document, DocumentError, NodeId, PathStep, Value};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use yrs::types::{Change, EntryChange, Event, Events, PathSegment};
use yrs::{Map, MapRef, Out, TransactionMut};

use crate::convert::out_to_json;
use crate::error::SyncError;
use crate::snapshot::{types_map, ROOT_KEY, TYPES_KEY};

/// Where an event's path lands in the local document.
#[derive(Debug, PartialEq)]
enum Location {
    /// The top-level map (`root`, `types`).
    Document,
    /// The `types` table itself; a rewritten record refreshes a node held
    /// locally.
    Types,
    Node { id: NodeId, path: Vec<PathStep> },
    Unknown,
}

fn locate(segments: &[PathSegment]) -> Location {
    match segments {
        [] => Location::Document,
        [PathSegment::Key(key)] if key.as_ref() == TYPES_KEY => Location::Types,
        [PathSegment::Key(key), PathSegment::Key(id), rest @ ..] if key.as_ref() == TYPES_KEY => Location::Node {
            id: NodeId::from(id.as_ref()),
            path: rest
                .iter()
                .map(|segment| match segment {
                    PathSegment::Key(key) => PathStep::Key(key.to_string()),
                    PathSegment::Index(index) => PathStep::Index(*index as usize),
                })
                .collect(),
        },
        _ => Location::Unknown,
    }
}

/// Replays one CRDT transaction's events onto the local document.
pub(crate) struct Replay<'t, 'doc> {
    txn: &'t TransactionMut<'doc>,
    doc_map: &'t MapRef,
    /// Nodes materialized from the current CRDT state during this replay;
    /// their own events are already reflected in that state.
    fresh: HashSet<NodeId>,
}

impl<'t, 'doc> Replay<'t, 'doc> {
    pub(crate) fn new(txn: &'t TransactionMut<'doc>, doc_map: &'t MapRef) -> Self {
        Self {
            txn,
            doc_map,
            fresh: HashSet::new(),
        }
    }

    /// Apply every event inside one local transaction tagged `Remote`.
    pub(crate) fn run(mut self, doc: &mut Document, events: &Events) {
        let mut tx = doc.transaction_with_origin(ChangeOrigin::Remote);
        for event in events.iter() {
            if let Err(err) = self.apply(&mut tx, event) {
                tracing::warn!(error = %err, "failed to replay remote event");
            }
        }
    }

    fn apply(&mut self, doc: &mut Document, event: &Event) -> Result<(), SyncError> {
        let txn = self.txn;
        match event {
            Event::Map(event) => {
                let segments: Vec<PathSegment> = event.path().into_iter().collect();
                let location = locate(&segments);
                let keys = event.keys(txn);
                match location {
                    Location::Document => {
                        for (key, change) in keys {
                            if key.as_ref() != ROOT_KEY {
                                continue;
                            }
                            if let EntryChange::Inserted(value) | EntryChange::Updated(_, value) = change {
                                if let Value::Node(root) = self.import(doc, value)? {
                                    doc.set_root(&root)?;
                                }
                            }
                        }
                        Ok(())
                    }
                    Location::Node { id, path } => {
                        if !self.is_live(doc, &id) {
                            return Ok(());
                        }
                        for (key, change) in keys {
                            if path.is_empty() && (key.as_ref() == "id" || key.as_ref() == "type") {
                                continue;
                            }
                            if let Err(err) = self.apply_entry(doc, &id, &path, key, change) {
                                tracing::warn!(%id, %key, error = %err, "failed to replay remote map change");
                            }
                        }
                        Ok(())
                    }
                    Location::Types => {
                        for (key, change) in keys {
                            if let EntryChange::Inserted(record) | EntryChange::Updated(_, record) = change {
                                let id = NodeId::from(key.as_ref());
                                if let Err(err) = self.refresh(doc, &id, record) {
                                    tracing::warn!(%id, error = %err, "failed to refresh node from rewritten record");
                                }
                            }
                        }
                        Ok(())
                    }
                    Location::Unknown => Ok(()),
                }
            }
            Event::Array(event) => {
                let segments: Vec<PathSegment> = event.path().into_iter().collect();
                let Location::Node { id, path } = locate(&segments) else {
                    tracing::debug!(?segments, "ignoring array event outside a record");
                    return Ok(());
                };
                if !self.is_live(doc, &id) {
                    return Ok(());
                }
                let mut index = 0usize;
                for change in event.delta(txn) {
                    match change {
                        Change::Retain(count) => index += *count as usize,
                        Change::Removed(count) => {
                            doc.splice(&id, &path, index, *count as usize, Vec::new())?;
                        }
                        Change::Added(values) => {
                            let mut added = Vec::with_capacity(values.len());
                            for value in values {
                                added.push(self.import(doc, value)?);
                            }
                            let count = added.len();
                            doc.splice(&id, &path, index, 0, added)?;
                            index += count;
                        }
                    }
                }
                Ok(())
            }
            _ => {
                tracing::debug!("ignoring unsupported crdt event");
                Ok(())
            }
        }
    }

    fn apply_entry(
        &mut self,
        doc: &mut Document,
        id: &NodeId,
        path: &[PathStep],
        key: &str,
        change: &EntryChange,
    ) -> Result<(), SyncError> {
        match change {
            EntryChange::Inserted(value) | EntryChange::Updated(_, value) => {
                let value = self.import(doc, value)?;
                doc.map_set(id, path, key, value)?;
            }
            // Fields cannot disappear locally; a removed field reads as null.
            EntryChange::Removed(_) if path.is_empty() => doc.set(id, key, Value::Null)?,
            EntryChange::Removed(_) => match doc.map_delete(id, path, key) {
                Ok(_) | Err(DocumentError::PathNotFound) => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }

    /// A record was (re)written for a node this document already holds, e.g.
    /// after the peer collected it and later attached it again. Edits made
    /// while it had no record only exist in the new record.
    fn refresh(&mut self, doc: &mut Document, id: &NodeId, record: &Out) -> Result<(), SyncError> {
        if self.fresh.contains(id) || !doc.contains(id) {
            return Ok(());
        }
        let Out::YMap(record) = record else {
            return Err(SyncError::MalformedDocument(format!("record {id} is not a map")));
        };
        let fields: Vec<(String, Out)> = record
            .iter(self.txn)
            .filter(|(key, _)| *key != "id" && *key != "type")
            .map(|(key, value)| (key.to_owned(), value))
            .collect();
        for (field, out) in fields {
            let value = self.import(doc, &out)?;
            if doc.get(id, &field) != Some(&value) {
                doc.set(id, &field, value)?;
            }
        }
        Ok(())
    }

    fn is_live(&self, doc: &Document, id: &NodeId) -> bool {
        if self.fresh.contains(id) {
            return false;
        }
        if !doc.contains(id) {
            tracing::debug!(%id, "event for a node not present locally; dropping");
            return false;
        }
        true
    }

    /// Convert a CRDT value to a local value, first materializing every
    /// referenced node the document does not hold yet.
    fn import(&mut self, doc: &mut Document, out: &Out) -> Result<Value, SyncError> {
        let json = out_to_json(self.txn, out);
        let mut stack = Vec::new();
        collect_json_refs(&json, &mut stack);
        stack.retain(|id| !doc.contains(id));
        if !stack.is_empty() {
            let types = types_map(self.txn, self.doc_map)
                .ok_or_else(|| SyncError::MalformedDocument("missing types map".to_owned()))?;
            let mut records = IndexMap::new();
            while let Some(id) = stack.pop() {
                if doc.contains(&id) || records.contains_key(&id) {
                    continue;
                }
                let record = match types.get(self.txn, id.as_str()) {
                    Some(record) => out_to_json(self.txn, &record),
                    None => return Err(CodecError::UnresolvedReference(id).into()),
                };
                let JsonValue::Object(record) = record else {
                    return Err(SyncError::MalformedDocument(format!("record {id} is not a map")));
                };
                for value in record.values() {
                    collect_json_refs(value, &mut stack);
                }
                records.insert(id, record);
            }
            let created = doc.materialize_records(&records)?;
            tracing::debug!(count = created.len(), "materialized remote nodes");
            self.fresh.extend(created);
        }
        Ok(Value::from_json(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn paths_resolve_to_records() {
        assert_eq!(locate(&[]), Location::Document);
        assert_eq!(locate(&[PathSegment::Key(Arc::from("types"))]), Location::Types);
        assert_eq!(
            locate(&[
                PathSegment::Key(Arc::from("types")),
                PathSegment::Key(Arc::from("abc")),
                PathSegment::Key(Arc::from("children")),
                PathSegment::Index(2),
            ]),
            Location::Node {
                id: NodeId::from("abc"),
                path: vec![PathStep::key("children"), PathStep::Index(2)],
            }
        );
        assert_eq!(locate(&[PathSegment::Key(Arc::from("other"))]), Location::Unknown);
    }
}
