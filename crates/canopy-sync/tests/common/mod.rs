#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use canopy_sync::snapshot::types_map;
use canopy_sync::{SyncOptions, SyncProvider};
use canopy_types::{t, ChangeBatch, Document, NodeId, SchemaDefinition, SchemaRegistry, Value};
use indexmap::IndexMap;
use serde_json::json;
use yrs::{Doc, Map, Transact};

pub fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::builder()
        .define(
            SchemaDefinition::new("Container")
                .field("label", t::string().default_value(""))
                .field("children", t::array(t::node("Item")).default_value(Value::Array(Vec::new()))),
        )
        .define(
            SchemaDefinition::new("Item")
                .abstract_kind()
                .field("name", t::string()),
        )
        .define(
            SchemaDefinition::new("Leaf")
                .extends("Item")
                .field("size", t::number().default_value(1.0)),
        )
        .define(
            SchemaDefinition::new("Box")
                .extends("Item")
                .field("child", t::node("Item").optional())
                .field("meta", t::map(t::any()).default_value(Value::Map(IndexMap::new()))),
        )
        .build()
        .expect("test registry must build");
    Arc::new(registry)
}

/// Document whose root is a `Container` holding one `Leaf`.
pub fn seeded_document(seed: u64) -> (Document, NodeId) {
    let mut doc = Document::with_id_seed(registry(), seed);
    let root = doc
        .create(
            "Container",
            json!({"label": "seeded", "children": [{"type": "Leaf", "name": "first"}]}),
        )
        .expect("container must build");
    doc.set_root(&root).expect("set root must succeed");
    (doc, root)
}

pub fn empty_document(seed: u64) -> Document {
    Document::with_id_seed(registry(), seed)
}

pub fn attach(doc: Document, client_id: u64) -> SyncProvider {
    attach_with(doc, client_id, SyncOptions::default())
}

pub fn attach_with(doc: Document, client_id: u64, options: SyncOptions) -> SyncProvider {
    SyncProvider::new(Rc::new(RefCell::new(doc)), Doc::with_client_id(client_id), options)
        .expect("provider must attach")
}

/// Send everything `to` is missing from `from`.
pub fn exchange(from: &SyncProvider, to: &SyncProvider) {
    let state_vector = to.state_vector().expect("state vector must encode");
    let update = from.encode_diff(&state_vector).expect("diff must encode");
    to.apply_update(&update).expect("update must apply");
}

pub fn sync_both(a: &SyncProvider, b: &SyncProvider) {
    exchange(a, b);
    exchange(b, a);
}

/// Ids present in the CRDT `types` table, sorted.
pub fn record_ids(provider: &SyncProvider, document_key: &str) -> Vec<String> {
    let doc_map = provider.ydoc().get_or_insert_map(document_key);
    let txn = provider.ydoc().transact();
    let Some(types) = types_map(&txn, &doc_map) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = types.keys(&txn).map(str::to_owned).collect();
    ids.sort();
    ids
}

pub fn record_batches(provider: &SyncProvider) -> Rc<RefCell<Vec<ChangeBatch>>> {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    provider
        .document()
        .borrow_mut()
        .on_change(move |_, batch| sink.borrow_mut().push(batch.clone()));
    batches
}

pub fn view(provider: &SyncProvider) -> serde_json::Value {
    provider.document().borrow().view().expect("view must render")
}

pub fn children(provider: &SyncProvider, root: &NodeId) -> Vec<Value> {
    provider
        .document()
        .borrow()
        .get(root, "children")
        .and_then(Value::as_array)
        .cloned()
        .expect("children must be an array")
}
