#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use canopy_types::{t, ChangeBatch, Document, SchemaDefinition, SchemaRegistry, Value};
use indexmap::IndexMap;

/// `Container{children: [Item]}` plus a small `Item` hierarchy with a
/// self-referencing `Box` for cycles and sharing.
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
                .alias("L")
                .field("size", t::number().default_value(1.0)),
        )
        .define(
            SchemaDefinition::new("Box")
                .extends("Item")
                .field("child", t::node("Item").optional())
                .field("items", t::array(t::node("Item")).default_value(Value::Array(Vec::new())))
                .field("meta", t::map(t::any()).default_value(Value::Map(IndexMap::new()))),
        )
        .build()
        .expect("test registry must build");
    Arc::new(registry)
}

pub fn document() -> Document {
    Document::with_id_seed(registry(), 0x5eed_c0de)
}

/// Capture every batch delivered to listeners.
pub fn record_batches(doc: &mut Document) -> Rc<RefCell<Vec<ChangeBatch>>> {
    let batches = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&batches);
    doc.on_change(move |_, batch| sink.borrow_mut().push(batch.clone()));
    batches
}
