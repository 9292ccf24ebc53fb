//! Schema for page-builder programs: expressions, variables, templates and
//! components.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::schema::{SchemaDefinition, SchemaRegistry};
use crate::validator::t;
use crate::value::Value;

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_map() -> Value {
    Value::Map(IndexMap::new())
}

pub fn definitions() -> Vec<SchemaDefinition> {
    vec![
        // expressions
        SchemaDefinition::new("Expression").abstract_kind(),
        SchemaDefinition::new("Literal").extends("Expression").field(
            "value",
            t::union([t::string(), t::number(), t::boolean(), t::null()]),
        ),
        SchemaDefinition::new("Identifier")
            .extends("Expression")
            .field("name", t::string()),
        SchemaDefinition::new("BinaryExpression")
            .extends("Expression")
            .field("left", t::node("Expression"))
            .field("operator", t::string())
            .field("right", t::node("Expression")),
        SchemaDefinition::new("ArrayExpression")
            .extends("Expression")
            .field("elements", t::array(t::node("Expression")).default_value(empty_array())),
        SchemaDefinition::new("ObjectExpression")
            .extends("Expression")
            .field("properties", t::map(t::node("Expression")).default_value(empty_map())),
        SchemaDefinition::new("MemberExpression")
            .extends("Expression")
            .field("object", t::node("Expression"))
            .field("property", t::string()),
        SchemaDefinition::new("ConditionalExpression")
            .extends("Expression")
            .field("test", t::node("Expression"))
            .field("consequent", t::node("Expression"))
            .field("alternate", t::node("Expression")),
        // variables
        SchemaDefinition::new("Variable")
            .abstract_kind()
            .extends("Expression")
            .field("name", t::string())
            .field("init", t::node("Expression").optional()),
        SchemaDefinition::new("Val").extends("Variable"),
        SchemaDefinition::new("ComponentProp")
            .extends("Variable")
            .field("kind", t::string().optional())
            .field("bindable", t::boolean().default_value(false)),
        // templates
        SchemaDefinition::new("Template")
            .abstract_kind()
            .field("props", t::map(t::node("Expression")).default_value(empty_map()))
            .field("if", t::node("Expression").optional())
            .field("each", t::node("ElementEach").optional())
            .field("classList", t::node("ObjectExpression").optional()),
        SchemaDefinition::new("SlottableTemplate")
            .abstract_kind()
            .extends("Template")
            .field("children", t::array(t::node("Template")).default_value(empty_array())),
        SchemaDefinition::new("TagTemplate")
            .extends("SlottableTemplate")
            .alias("Tag")
            .field("tag", t::string()),
        SchemaDefinition::new("ComponentTemplate")
            .extends("SlottableTemplate")
            .field("component", t::node("Identifier")),
        SchemaDefinition::new("SlotTemplate")
            .extends("Template")
            .field("name", t::string().optional()),
        SchemaDefinition::new("ElementEach")
            .field("iterator", t::node("Identifier"))
            .field("alias", t::string())
            .field("index", t::string().optional()),
        // components
        SchemaDefinition::new("Component")
            .abstract_kind()
            .field("name", t::string()),
        SchemaDefinition::new("CanopyComponent")
            .extends("Component")
            .field("props", t::array(t::node("ComponentProp")).default_value(empty_array()))
            .field("state", t::array(t::node("Val")).default_value(empty_array()))
            .field("template", t::node("Template").optional()),
        SchemaDefinition::new("ExternalComponent")
            .extends("Component")
            .field(
                "source",
                t::model([
                    ("module", t::string()),
                    ("export", t::string().default_value("default")),
                ]),
            )
            .field("props", t::array(t::node("ComponentProp")).default_value(empty_array())),
        SchemaDefinition::new("Program")
            .field("globals", t::array(t::node("Val")).default_value(empty_array()))
            .field("components", t::array(t::node("Component")).default_value(empty_array())),
    ]
}

/// Shared registry of the builtin kinds.
pub fn registry() -> Arc<SchemaRegistry> {
    static REGISTRY: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            let builder = definitions()
                .into_iter()
                .fold(SchemaRegistry::builder(), |builder, def| builder.define(def));
            Arc::new(
                builder
                    .build()
                    .expect("builtin schema definitions are consistent"),
            )
        })
        .clone()
}
