mod common;

use canopy_types::{CloneOptions, DocumentError, NodeId, PathStep, Value};
use serde_json::json;

#[test]
fn missing_fields_take_their_defaults() {
    let mut doc = common::document();
    let id = doc
        .create("Leaf", json!({"name": "a"}))
        .expect("leaf must construct");
    let node = doc.node(&id).expect("leaf exists");
    assert_eq!(node.get("size"), Some(&Value::Number(1.0)));
    assert_eq!(node.owner(), Some(doc.id()));
    assert_eq!(id.as_str().len(), canopy_types::id::ID_LENGTH);

    let boxed = doc
        .create("Box", json!({"name": "b"}))
        .expect("box must construct");
    assert_eq!(doc.get(&boxed, "child"), Some(&Value::Null));
    assert_eq!(doc.get(&boxed, "items"), Some(&Value::Array(vec![])));
}

#[test]
fn invalid_field_reports_kind_and_field() {
    let mut doc = common::document();
    let err = doc
        .create("Leaf", json!({"name": "a", "size": "big"}))
        .expect_err("string size must be rejected");
    let DocumentError::SchemaViolation(violation) = err else {
        panic!("expected schema violation, got {err:?}");
    };
    assert_eq!(violation.kind, "Leaf");
    assert_eq!(violation.field, "size");
    assert_eq!(violation.expected, "number");
    assert_eq!(violation.found, "\"big\"");
}

#[test]
fn nested_violations_keep_the_innermost_location() {
    let mut doc = common::document();
    let err = doc
        .create(
            "Container",
            json!({"children": [{"type": "Leaf", "name": "ok"}, {"type": "Leaf", "name": 3}]}),
        )
        .expect_err("second child is invalid");
    let DocumentError::SchemaViolation(violation) = err else {
        panic!("expected schema violation, got {err:?}");
    };
    assert_eq!((violation.kind.as_str(), violation.field.as_str()), ("Leaf", "name"));
}

#[test]
fn failed_construction_stages_nothing() {
    let mut doc = common::document();
    doc.create(
        "Container",
        json!({"children": [{"type": "Leaf", "name": "ok"}, {"type": "Container"}]}),
    )
    .expect_err("Container is not an Item");
    assert!(doc.is_empty(), "no node may survive a failed construction");
}

#[test]
fn inline_children_become_separate_nodes() {
    let mut doc = common::document();
    let root = doc
        .create(
            "Container",
            json!({"children": [{"type": "Leaf", "id": "leaf-a", "name": "a"}, {"type": "Box", "name": "b"}]}),
        )
        .expect("container must construct");
    assert_eq!(doc.len(), 3);
    let children = doc.get(&root, "children").and_then(Value::as_array).expect("children array");
    assert_eq!(children[0], Value::Node(NodeId::from("leaf-a")));
    assert!(matches!(children[1], Value::Node(_)));
}

#[test]
fn supplied_ids_are_checked() {
    let mut doc = common::document();
    doc.create("Leaf", json!({"id": "same", "name": "a"}))
        .expect("first use of id");
    let err = doc
        .create("Leaf", json!({"id": "same", "name": "b"}))
        .expect_err("duplicate id");
    assert_eq!(err, DocumentError::DuplicateId(NodeId::from("same")));

    let err = doc
        .create("Leaf", json!({"id": "$$typeId", "name": "b"}))
        .expect_err("reserved id");
    assert!(matches!(err, DocumentError::InvalidId(_)));
}

#[test]
fn references_must_resolve_and_match_kind() {
    let mut doc = common::document();
    let err = doc
        .create("Container", json!({"children": [{"ref": "ghost"}]}))
        .expect_err("dangling reference");
    assert_eq!(err, DocumentError::UnresolvedReference(NodeId::from("ghost")));

    let other = doc.create("Container", json!({})).expect("container");
    let err = doc
        .create("Container", json!({"children": [{"ref": other.as_str()}]}))
        .expect_err("Container is not an Item");
    assert!(matches!(err, DocumentError::SchemaViolation(_)));
}

#[test]
fn clone_copies_shared_and_cyclic_structure_once() {
    let mut doc = common::document();
    let a = doc.create("Box", json!({"name": "a"})).expect("box a");
    let shared = doc.create("Leaf", json!({"name": "shared", "size": 4})).expect("leaf");
    let b = doc
        .create("Box", json!({"name": "b", "child": {"ref": a.as_str()}, "items": [{"ref": shared.as_str()}]}))
        .expect("box b");
    doc.set(&a, "child", &b).expect("close the cycle");
    doc.set(&a, "items", vec![Value::Node(shared.clone())]).expect("share leaf");

    let before = doc.len();
    let copy = doc.clone_node(&a, CloneOptions::default()).expect("clone must succeed");
    assert_eq!(doc.len(), before + 3, "a, b and the shared leaf are copied once");
    assert_ne!(copy, a);

    let copy_b = doc.get(&copy, "child").and_then(Value::as_node).cloned().expect("copied child");
    assert_ne!(copy_b, b);
    assert_eq!(doc.get(&copy_b, "child"), Some(&Value::Node(copy.clone())));

    let leaf_via_a = doc.value_at(&copy, &[PathStep::key("items"), PathStep::Index(0)]).cloned();
    let leaf_via_b = doc.value_at(&copy_b, &[PathStep::key("items"), PathStep::Index(0)]).cloned();
    assert_eq!(leaf_via_a, leaf_via_b);
    assert_ne!(leaf_via_a, Some(Value::Node(shared)));
}

#[test]
fn clone_without_new_ids_collides_in_the_same_document() {
    let mut doc = common::document();
    let leaf = doc.create("Leaf", json!({"name": "a"})).expect("leaf");
    let err = doc
        .clone_node(&leaf, CloneOptions { replace_ids: false })
        .expect_err("same id in same arena");
    assert_eq!(err, DocumentError::DuplicateId(leaf));
}

#[test]
fn import_keeps_ids_across_documents() {
    let mut source = common::document();
    let root = source
        .create("Container", json!({"children": [{"type": "Leaf", "name": "x"}]}))
        .expect("source tree");

    let mut target = common::document();
    let copy = target
        .import(&source, &root, CloneOptions { replace_ids: false })
        .expect("import must succeed");
    assert_eq!(copy, root);
    assert_eq!(target.len(), 2);
    assert_eq!(target.node(&root).and_then(|n| n.owner()), Some(target.id()));
    assert_eq!(source.node(&root).and_then(|n| n.owner()), Some(source.id()));
}

#[test]
fn nodes_cannot_be_shared_between_documents() {
    let mut first = common::document();
    let leaf = first.create("Leaf", json!({"name": "a"})).expect("leaf");
    let node = first.node(&leaf).cloned().expect("leaf exists");

    let mut second = common::document();
    let err = second.adopt(node).expect_err("still owned by first");
    assert_eq!(
        err,
        DocumentError::CrossTreeReuse {
            id: leaf.clone(),
            owner: first.id()
        }
    );

    let detached = first.detach(&leaf).expect("unreachable node detaches");
    assert_eq!(detached.owner(), None);
    assert!(!first.contains(&leaf));
    let adopted = second.adopt(detached).expect("detached node can move");
    assert_eq!(adopted, leaf);
    assert_eq!(second.node(&leaf).and_then(|n| n.owner()), Some(second.id()));
}

#[test]
fn reachable_nodes_cannot_be_detached() {
    let mut doc = common::document();
    let root = doc
        .create("Container", json!({"children": [{"type": "Leaf", "id": "kid", "name": "k"}]}))
        .expect("tree");
    doc.set_root(&root).expect("root");
    let err = doc.detach(&NodeId::from("kid")).expect_err("kid is reachable");
    assert_eq!(err, DocumentError::NodeInUse(NodeId::from("kid")));
}
