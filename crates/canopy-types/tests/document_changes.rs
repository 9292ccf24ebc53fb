mod common;

use canopy_types::{ChangeOp, ChangeOrigin, DocumentError, NodeId, PathStep, Target, Value};
use serde_json::json;

fn children() -> Vec<PathStep> {
    vec![PathStep::key("children")]
}

#[test]
fn each_mutation_outside_a_transaction_is_its_own_batch() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = common::record_batches(&mut doc);

    doc.set_root(&root).expect("set root");
    doc.set(&root, "label", "hello").expect("set label");

    let batches = batches.borrow();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].origin, ChangeOrigin::Local);
    assert_eq!(batches[0].changes[0].target, Target::Root);
    assert_eq!(
        batches[0].changes[0].op,
        ChangeOp::Add {
            key: "root".into(),
            new_value: Value::Node(root.clone())
        }
    );
    assert_eq!(
        batches[1].changes[0].op,
        ChangeOp::Update {
            key: "label".into(),
            old_value: Value::from(""),
            new_value: Value::from("hello")
        }
    );
}

#[test]
fn writing_an_equal_value_records_nothing() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({"label": "same"})).expect("container");
    let batches = common::record_batches(&mut doc);
    doc.set(&root, "label", "same").expect("no-op write");
    assert!(batches.borrow().is_empty());
}

#[test]
fn unknown_fields_and_bad_values_are_rejected() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let err = doc.set(&root, "nope", 1.0).expect_err("unknown field");
    assert_eq!(
        err,
        DocumentError::UnknownField {
            kind: "Container".into(),
            field: "nope".into()
        }
    );
    let err = doc.set(&root, "label", 3.0).expect_err("number is not a string");
    assert!(matches!(err, DocumentError::SchemaViolation(v) if v.field == "label"));
    let err = doc.set(&NodeId::from("ghost"), "label", "x").expect_err("unknown node");
    assert_eq!(err, DocumentError::UnknownNode(NodeId::from("ghost")));
}

#[test]
fn transactions_deliver_one_batch() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = common::record_batches(&mut doc);

    {
        let mut tx = doc.transaction();
        tx.push(&root, &children(), json!({"type": "Leaf", "name": "a"}))
            .expect("push a");
        {
            let mut inner = tx.transaction();
            inner
                .push(&root, &children(), json!({"type": "Leaf", "name": "b"}))
                .expect("push b");
        }
        assert!(batches.borrow().is_empty(), "nested scope must not flush");
        tx.set(&root, "label", "two").expect("label");
    }

    let batches = batches.borrow();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].changes.len(), 3);
    assert!(matches!(
        batches[0].changes[1].op,
        ChangeOp::Splice {
            index: 1,
            removed_count: 0,
            ..
        }
    ));
}

#[test]
fn change_closure_batches_and_returns() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = common::record_batches(&mut doc);
    let pushed = doc.change(|doc| {
        for name in ["a", "b", "c"] {
            doc.push(&root, &children(), json!({"type": "Leaf", "name": name}))
                .expect("push");
        }
        3
    });
    assert_eq!(pushed, 3);
    assert_eq!(batches.borrow().len(), 1);
}

#[test]
fn remote_origin_is_carried_by_the_outermost_scope() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = common::record_batches(&mut doc);
    {
        let mut tx = doc.transaction_with_origin(ChangeOrigin::Remote);
        let mut inner = tx.transaction();
        inner.set(&root, "label", "remote").expect("label");
    }
    assert_eq!(batches.borrow()[0].origin, ChangeOrigin::Remote);
    doc.set(&root, "label", "local").expect("label");
    assert_eq!(batches.borrow()[1].origin, ChangeOrigin::Local);
}

#[test]
fn listeners_can_be_removed() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = std::rc::Rc::new(std::cell::RefCell::new(0));
    let sink = std::rc::Rc::clone(&batches);
    let id = doc.on_change(move |_, _| *sink.borrow_mut() += 1);
    doc.set(&root, "label", "one").expect("label");
    assert!(doc.off_change(id));
    assert!(!doc.off_change(id));
    doc.set(&root, "label", "two").expect("label");
    assert_eq!(*batches.borrow(), 1);
}

#[test]
fn listeners_observe_the_post_change_document() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let seen = std::rc::Rc::new(std::cell::RefCell::new(None));
    let sink = std::rc::Rc::clone(&seen);
    let watched = root.clone();
    doc.on_change(move |doc, _| {
        *sink.borrow_mut() = doc.get(&watched, "label").cloned();
    });
    doc.set(&root, "label", "after").expect("label");
    assert_eq!(*seen.borrow(), Some(Value::from("after")));
}

#[test]
fn array_operations_record_splices_and_replaces() {
    let mut doc = common::document();
    let root = doc
        .create(
            "Container",
            json!({"children": [{"type": "Leaf", "id": "a", "name": "a"}, {"type": "Leaf", "id": "b", "name": "b"}]}),
        )
        .expect("container");
    let batches = common::record_batches(&mut doc);

    let removed = doc.remove(&root, &children(), 0).expect("remove a");
    assert_eq!(removed, Value::Node(NodeId::from("a")));
    doc.insert(&root, &children(), 1, &NodeId::from("a")).expect("reinsert a");
    let old = doc
        .replace_at(&root, &children(), 0, json!({"type": "Leaf", "id": "c", "name": "c"}))
        .expect("replace b");
    assert_eq!(old, Value::Node(NodeId::from("b")));

    let ids: Vec<Value> = doc.get(&root, "children").and_then(Value::as_array).cloned().expect("children");
    assert_eq!(ids, vec![Value::Node("c".into()), Value::Node("a".into())]);

    let batches = batches.borrow();
    assert_eq!(batches.len(), 3);
    assert_eq!(
        batches[0].changes[0].op,
        ChangeOp::Splice {
            index: 0,
            removed_count: 1,
            added: vec![],
            removed: vec![Value::Node("a".into())]
        }
    );
    assert_eq!(
        batches[2].changes[0].op,
        ChangeOp::Replace {
            index: 0,
            old_value: Value::Node("b".into()),
            new_value: Value::Node("c".into())
        }
    );
}

#[test]
fn out_of_range_splices_fail_without_recording() {
    let mut doc = common::document();
    let root = doc.create("Container", json!({})).expect("container");
    let batches = common::record_batches(&mut doc);
    let err = doc.splice(&root, &children(), 1, 0, vec![]).expect_err("index past end");
    assert_eq!(err, DocumentError::IndexOutOfBounds { index: 1, len: 0 });
    let err = doc.remove(&root, &children(), 0).expect_err("nothing to remove");
    assert_eq!(err, DocumentError::IndexOutOfBounds { index: 1, len: 0 });
    let err = doc.push(&root, &[PathStep::key("label")], "x").expect_err("label is not an array");
    assert_eq!(err, DocumentError::NotArray);
    assert!(batches.borrow().is_empty());
}

#[test]
fn oversized_removal_counts_are_out_of_bounds() {
    let mut doc = common::document();
    let root = doc
        .create("Container", json!({"children": [{"type": "Leaf", "name": "a"}]}))
        .expect("container");
    let batches = common::record_batches(&mut doc);
    let err = doc
        .splice(&root, &children(), 1, usize::MAX, vec![])
        .expect_err("removal past end");
    assert_eq!(err, DocumentError::IndexOutOfBounds { index: usize::MAX, len: 1 });
    let err = doc
        .splice(&root, &children(), 0, 2, vec![])
        .expect_err("removal past end");
    assert_eq!(err, DocumentError::IndexOutOfBounds { index: 2, len: 1 });
    assert_eq!(doc.get(&root, "children").and_then(Value::as_array).map(Vec::len), Some(1));
    assert!(batches.borrow().is_empty());
}

#[test]
fn nested_maps_support_add_update_delete() {
    let mut doc = common::document();
    let node = doc.create("Box", json!({"name": "b"})).expect("box");
    let meta = vec![PathStep::key("meta")];
    let batches = common::record_batches(&mut doc);

    doc.map_set(&node, &meta, "color", "red").expect("add");
    doc.map_set(&node, &meta, "color", "blue").expect("update");
    doc.map_set(&node, &meta, "color", "blue").expect("no-op");
    let old = doc.map_delete(&node, &meta, "color").expect("delete");
    assert_eq!(old, Value::from("blue"));
    assert_eq!(
        doc.map_delete(&node, &meta, "color").expect_err("already gone"),
        DocumentError::PathNotFound
    );

    let ops: Vec<ChangeOp> = batches.borrow().iter().map(|b| b.changes[0].op.clone()).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOp::Add {
                key: "color".into(),
                new_value: Value::from("red")
            },
            ChangeOp::Update {
                key: "color".into(),
                old_value: Value::from("red"),
                new_value: Value::from("blue")
            },
            ChangeOp::Delete {
                key: "color".into(),
                old_value: Value::from("blue")
            },
        ]
    );
    assert_eq!(batches.borrow()[0].changes[0].path, meta);
}

#[test]
fn schema_fields_cannot_be_deleted() {
    let mut doc = common::document();
    let node = doc.create("Box", json!({"name": "b"})).expect("box");
    let err = doc.map_delete(&node, &[], "name").expect_err("fields stay");
    assert_eq!(
        err,
        DocumentError::FieldDeletion {
            kind: "Box".into(),
            field: "name".into()
        }
    );
}

#[test]
fn garbage_collection_keeps_shared_nodes() {
    let mut doc = common::document();
    let root = doc
        .create(
            "Container",
            json!({"children": [
                {"type": "Box", "id": "x", "name": "x", "child": {"type": "Leaf", "id": "shared", "name": "s"}},
                {"type": "Box", "id": "y", "name": "y", "child": {"ref": "shared"}}
            ]}),
        )
        .expect("tree");
    doc.set_root(&root).expect("root");
    doc.create("Leaf", json!({"id": "orphan", "name": "o"})).expect("orphan");

    doc.remove(&root, &children(), 0).expect("drop x");
    let mut removed = doc.collect_garbage();
    removed.sort();
    assert_eq!(removed, vec![NodeId::from("orphan"), NodeId::from("x")]);
    assert!(doc.contains(&NodeId::from("shared")));
    assert_eq!(doc.reachable().len(), 3);
}

#[test]
fn view_renders_back_edges_as_refs() {
    let mut doc = common::document();
    let a = doc.create("Box", json!({"id": "a", "name": "a"})).expect("a");
    let b = doc
        .create("Box", json!({"id": "b", "name": "b", "child": {"ref": "a"}}))
        .expect("b");
    doc.set(&a, "child", &b).expect("cycle");
    doc.set_root(&a).expect("root");

    let view = doc.view().expect("view");
    assert_eq!(view["child"]["id"], "b");
    assert_eq!(view["child"]["child"], json!({"ref": "a"}));
}
