//! Field validators.
//!
//! A [`Validator`] decides whether a raw [`Value`] is acceptable for a field
//! (`validate`) and turns it into the stored value (`format`): defaults are
//! filled in, nested node descriptions are constructed, and existing node
//! references pass through untouched unless the surrounding build clones.

use indexmap::IndexMap;

use crate::build::{BuildCtx, BuildMode};
use crate::error::{DocumentError, SchemaViolation};
use crate::value::{NodeId, Value};

static ANY: Validator = Validator::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Number,
    Boolean,
    Null,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Number(n)) => n.is_finite(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Null, Value::Null) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    Any,
    Primitive(Primitive),
    Constant(Value),
    /// Branches are tried in order; the first that validates wins.
    Union(Vec<Validator>),
    Array(Box<Validator>),
    /// String-keyed map with uniform values.
    Map(Box<Validator>),
    /// Plain record with a fixed set of fields.
    Model(IndexMap<String, Validator>),
    /// Node of the given kind (or any descendant kind).
    Node(String),
    /// Missing or null becomes `Null`.
    Optional(Box<Validator>),
    /// Missing or null becomes the coerced default.
    Default(Box<Validator>, Value),
}

impl Validator {
    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    pub fn default_value(self, value: impl Into<Value>) -> Self {
        Self::Default(Box::new(self), value.into())
    }

    /// Whether a field with this validator may be omitted from raw input.
    pub fn accepts_missing(&self) -> bool {
        match self {
            Self::Any | Self::Optional(_) | Self::Default(..) => true,
            Self::Primitive(Primitive::Null) => true,
            Self::Union(branches) => branches.iter().any(Self::accepts_missing),
            _ => false,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_owned(),
            Self::Primitive(p) => p.name().to_owned(),
            Self::Constant(v) => format!("constant {}", v.describe()),
            Self::Union(branches) => {
                let names: Vec<String> = branches.iter().map(Self::describe).collect();
                format!("union<{}>", names.join(" | "))
            }
            Self::Array(item) => format!("array<{}>", item.describe()),
            Self::Map(value) => format!("map<{}>", value.describe()),
            Self::Model(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("model{{{}}}", names.join(", "))
            }
            Self::Node(kind) => format!("node<{kind}>"),
            Self::Optional(inner) => format!("optional<{}>", inner.describe()),
            Self::Default(inner, _) => inner.describe(),
        }
    }

    /// Kinds named by `Node` validators anywhere inside this validator.
    pub fn referenced_kinds<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Node(kind) => out.push(kind),
            Self::Union(branches) => branches.iter().for_each(|b| b.referenced_kinds(out)),
            Self::Array(inner) | Self::Map(inner) | Self::Optional(inner) | Self::Default(inner, _) => {
                inner.referenced_kinds(out)
            }
            Self::Model(fields) => fields.values().for_each(|f| f.referenced_kinds(out)),
            _ => {}
        }
    }

    /// Coerce a raw value (`None` when the field was omitted) into the stored
    /// value, constructing nested nodes into `ctx`.
    pub(crate) fn get(&self, raw: Option<&Value>, ctx: &mut BuildCtx<'_>) -> Result<Value, DocumentError> {
        match self {
            Self::Optional(inner) => match raw {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(value) => inner.get(Some(value), ctx),
            },
            Self::Default(inner, default) => match raw {
                None | Some(Value::Null) => inner.get(Some(default), ctx),
                Some(value) => inner.get(Some(value), ctx),
            },
            _ => {
                let null = Value::Null;
                let raw = raw.unwrap_or(&null);
                if !self.validate(raw, ctx) {
                    if let Some(id) = first_unresolved(raw, ctx) {
                        return Err(DocumentError::UnresolvedReference(id));
                    }
                    return Err(self.violation(raw));
                }
                self.format(raw, ctx)
            }
        }
    }

    pub(crate) fn validate(&self, raw: &Value, ctx: &BuildCtx<'_>) -> bool {
        match self {
            Self::Any => true,
            Self::Primitive(p) => p.accepts(raw),
            Self::Constant(expected) => raw == expected,
            Self::Union(branches) => branches.iter().any(|b| b.validate(raw, ctx)),
            Self::Array(item) => match raw {
                Value::Array(items) => items.iter().all(|v| item.validate(v, ctx)),
                _ => false,
            },
            Self::Map(inner) => match raw {
                Value::Map(map) => map.values().all(|v| inner.validate(v, ctx)),
                _ => false,
            },
            Self::Model(fields) => match raw {
                Value::Map(map) => fields.iter().all(|(name, field)| match map.get(name) {
                    Some(v) => field.validate(v, ctx) || (v.is_null() && field.accepts_missing()),
                    None => field.accepts_missing(),
                }),
                _ => false,
            },
            Self::Node(kind) => match raw {
                Value::Node(id) => ctx
                    .kind_of(id)
                    .is_some_and(|actual| ctx.registry().is_a(actual, kind)),
                Value::Map(map) => match map.get("type") {
                    Some(Value::String(actual)) => ctx.registry().get(actual).is_ok_and(|schema| {
                        !schema.is_abstract() && ctx.registry().is_a(schema.kind(), kind)
                    }),
                    _ => false,
                },
                _ => false,
            },
            Self::Optional(inner) | Self::Default(inner, _) => raw.is_null() || inner.validate(raw, ctx),
        }
    }

    fn format(&self, raw: &Value, ctx: &mut BuildCtx<'_>) -> Result<Value, DocumentError> {
        match self {
            // A branch whose shape matches can still fail deeper (a nested
            // node missing a field); the next matching branch gets a turn.
            Self::Union(branches) => {
                let mut first_violation = None;
                for branch in branches {
                    if !branch.validate(raw, ctx) {
                        continue;
                    }
                    let checkpoint = ctx.checkpoint();
                    match branch.get(Some(raw), ctx) {
                        Ok(value) => return Ok(value),
                        Err(err @ DocumentError::SchemaViolation(_)) => {
                            ctx.rollback(checkpoint);
                            first_violation.get_or_insert(err);
                        }
                        Err(err) => return Err(err),
                    }
                }
                Err(first_violation.unwrap_or_else(|| self.violation(raw)))
            }
            Self::Array(item) => match raw {
                Value::Array(items) => items
                    .iter()
                    .map(|v| item.get(Some(v), ctx))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(self.violation(raw)),
            },
            Self::Map(inner) => match raw {
                Value::Map(map) => {
                    let mut out = IndexMap::with_capacity(map.len());
                    for (key, v) in map {
                        out.insert(key.clone(), inner.get(Some(v), ctx)?);
                    }
                    Ok(Value::Map(out))
                }
                _ => Err(self.violation(raw)),
            },
            Self::Model(fields) => match raw {
                Value::Map(map) => {
                    let mut out = IndexMap::with_capacity(fields.len());
                    for (name, field) in fields {
                        out.insert(name.clone(), field.get(map.get(name), ctx)?);
                    }
                    Ok(Value::Map(out))
                }
                _ => Err(self.violation(raw)),
            },
            Self::Node(_) => match raw {
                Value::Node(id) => match ctx.mode() {
                    BuildMode::Clone { .. } => ctx.clone_node(id).map(Value::Node),
                    BuildMode::Construct => Ok(Value::Node(id.clone())),
                },
                Value::Map(map) => {
                    let kind = match map.get("type") {
                        Some(Value::String(kind)) => kind.clone(),
                        _ => return Err(self.violation(raw)),
                    };
                    ctx.construct(&kind, raw).map(Value::Node)
                }
                _ => Err(self.violation(raw)),
            },
            Self::Optional(inner) | Self::Default(inner, _) => inner.format(raw, ctx),
            Self::Any => match ctx.mode() {
                BuildMode::Clone { .. } => remap_refs(raw, ctx),
                BuildMode::Construct => Ok(raw.clone()),
            },
            Self::Primitive(_) | Self::Constant(_) => Ok(raw.clone()),
        }
    }

    fn violation(&self, raw: &Value) -> DocumentError {
        DocumentError::SchemaViolation(SchemaViolation {
            kind: String::new(),
            field: String::new(),
            expected: self.describe(),
            found: raw.describe(),
        })
    }

    fn matches_shape(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Array(_) => matches!(value, Value::Array(_)),
            Self::Map(_) | Self::Model(_) => matches!(value, Value::Map(_)),
            Self::Union(branches) => branches.iter().any(|b| b.matches_shape(value)),
            Self::Optional(inner) | Self::Default(inner, _) => inner.matches_shape(value),
            _ => false,
        }
    }

    /// Strip optional/default wrappers and pick the union branch whose
    /// container shape matches `value`.
    pub(crate) fn unwrap_for(&self, value: &Value) -> &Validator {
        let mut current = self;
        loop {
            current = match current {
                Self::Optional(inner) | Self::Default(inner, _) => inner,
                Self::Union(branches) => match branches.iter().find(|b| b.matches_shape(value)) {
                    Some(branch) => branch,
                    None => return current,
                },
                _ => return current,
            };
        }
    }

    /// Validator for the elements of the array `container`.
    pub(crate) fn item(&self, container: &Value) -> Option<&Validator> {
        match self.unwrap_for(container) {
            Self::Array(item) => Some(item),
            Self::Any => Some(&ANY),
            _ => None,
        }
    }

    /// Validator for entry `key` of the map `container`.
    pub(crate) fn entry(&self, key: &str, container: &Value) -> Option<&Validator> {
        match self.unwrap_for(container) {
            Self::Map(inner) => Some(inner),
            Self::Model(fields) => fields.get(key),
            Self::Any => Some(&ANY),
            _ => None,
        }
    }
}

/// Untyped values still carry references; a clone must follow them too.
fn remap_refs(raw: &Value, ctx: &mut BuildCtx<'_>) -> Result<Value, DocumentError> {
    match raw {
        Value::Node(id) => ctx.clone_node(id).map(Value::Node),
        Value::Array(items) => items
            .iter()
            .map(|v| remap_refs(v, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Map(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (key, v) in map {
                out.insert(key.clone(), remap_refs(v, ctx)?);
            }
            Ok(Value::Map(out))
        }
        other => Ok(other.clone()),
    }
}

fn first_unresolved(raw: &Value, ctx: &BuildCtx<'_>) -> Option<NodeId> {
    let mut refs = Vec::new();
    raw.collect_refs(&mut refs);
    refs.into_iter().find(|id| ctx.kind_of(id).is_none())
}

/// Declarative constructors, e.g. `t::array(t::node("Template"))`.
pub mod t {
    use super::{Primitive, Validator};
    use crate::value::Value;

    pub fn any() -> Validator {
        Validator::Any
    }

    pub fn string() -> Validator {
        Validator::Primitive(Primitive::String)
    }

    pub fn number() -> Validator {
        Validator::Primitive(Primitive::Number)
    }

    pub fn boolean() -> Validator {
        Validator::Primitive(Primitive::Boolean)
    }

    pub fn null() -> Validator {
        Validator::Primitive(Primitive::Null)
    }

    pub fn constant(value: impl Into<Value>) -> Validator {
        Validator::Constant(value.into())
    }

    pub fn union(branches: impl IntoIterator<Item = Validator>) -> Validator {
        Validator::Union(branches.into_iter().collect())
    }

    pub fn array(item: Validator) -> Validator {
        Validator::Array(Box::new(item))
    }

    pub fn map(value: Validator) -> Validator {
        Validator::Map(Box::new(value))
    }

    pub fn model<'a>(fields: impl IntoIterator<Item = (&'a str, Validator)>) -> Validator {
        Validator::Model(
            fields
                .into_iter()
                .map(|(name, v)| (name.to_owned(), v))
                .collect(),
        )
    }

    pub fn node(kind: &str) -> Validator {
        Validator::Node(kind.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::id::IdGenerator;
    use crate::schema::{SchemaDefinition, SchemaRegistry};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .define(SchemaDefinition::new("Expression").abstract_kind())
            .define(
                SchemaDefinition::new("Literal")
                    .extends("Expression")
                    .field("value", t::union([t::string(), t::number()])),
            )
            .build()
            .expect("registry builds")
    }

    fn coerce(validator: &Validator, raw: Option<serde_json::Value>) -> Result<Value, DocumentError> {
        let registry = registry();
        let arena = Arena::default();
        let mut ids = IdGenerator::seeded(1);
        let mut ctx = BuildCtx::new(&registry, &arena, &mut ids);
        let raw = raw.map(Value::from);
        validator.get(raw.as_ref(), &mut ctx)
    }

    #[test]
    fn union_takes_first_validating_branch() {
        let v = t::union([t::constant("auto"), t::string(), t::number()]);
        assert_eq!(coerce(&v, Some(json!("auto"))).unwrap(), Value::from("auto"));
        assert_eq!(coerce(&v, Some(json!(4))).unwrap(), Value::Number(4.0));
        let err = coerce(&v, Some(json!(true))).unwrap_err();
        assert!(matches!(err, DocumentError::SchemaViolation(_)));
    }

    #[test]
    fn union_falls_through_when_a_nested_node_fails_to_build() {
        let registry = registry();
        let arena = Arena::default();
        let mut ids = IdGenerator::seeded(1);
        let mut ctx = BuildCtx::new(&registry, &arena, &mut ids);
        let v = t::union([t::node("Literal"), t::map(t::any())]);
        let raw = Value::from(json!({"type": "Literal"}));

        let out = v.get(Some(&raw), &mut ctx).expect("map branch must accept");
        assert_eq!(out, raw);
        assert!(ctx.finish().is_empty());
    }

    #[test]
    fn union_reports_the_first_branch_failure_when_all_fail() {
        let v = t::union([t::node("Literal"), t::node("Expression")]);
        let err = coerce(&v, Some(json!({"type": "Literal"}))).unwrap_err();
        let DocumentError::SchemaViolation(violation) = err else {
            panic!("expected a schema violation, got {err:?}");
        };
        assert_eq!(violation.kind, "Literal");
        assert_eq!(violation.field, "value");
    }

    #[test]
    fn default_fills_missing_and_null() {
        let v = t::number().default_value(1.5);
        assert_eq!(coerce(&v, None).unwrap(), Value::Number(1.5));
        assert_eq!(coerce(&v, Some(json!(null))).unwrap(), Value::Number(1.5));
        assert_eq!(coerce(&v, Some(json!(3))).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn optional_missing_is_null() {
        let v = t::string().optional();
        assert_eq!(coerce(&v, None).unwrap(), Value::Null);
        assert!(coerce(&t::string(), None).is_err());
    }

    #[test]
    fn model_fills_nested_defaults() {
        let v = t::model([
            ("module", t::string()),
            ("export", t::string().default_value("default")),
        ]);
        let out = coerce(&v, Some(json!({"module": "ui"}))).unwrap();
        assert_eq!(
            out,
            Value::from(json!({"module": "ui", "export": "default"}))
        );
        assert!(coerce(&v, Some(json!({"export": "x"}))).is_err());
    }

    #[test]
    fn map_validates_every_value() {
        let v = t::map(t::number());
        assert!(coerce(&v, Some(json!({"a": 1, "b": 2}))).is_ok());
        assert!(coerce(&v, Some(json!({"a": 1, "b": "2"}))).is_err());
    }

    #[test]
    fn node_validator_constructs_nested_nodes_of_descendant_kinds() {
        let v = t::node("Expression");
        let out = coerce(&v, Some(json!({"type": "Literal", "value": 2}))).unwrap();
        assert!(matches!(out, Value::Node(_)));
        let err = coerce(&v, Some(json!({"type": "Expression"}))).unwrap_err();
        assert!(matches!(err, DocumentError::SchemaViolation(_)));
    }

    #[test]
    fn unknown_node_reference_is_unresolved() {
        let v = t::node("Expression");
        let err = coerce(&v, Some(json!({"ref": "missing"}))).unwrap_err();
        assert_eq!(err, DocumentError::UnresolvedReference(NodeId::from("missing")));
    }

    #[test]
    fn unwrap_for_picks_union_branch_by_shape() {
        let v = t::union([t::string(), t::array(t::number())]).optional();
        let arr = Value::Array(vec![]);
        assert_eq!(v.item(&arr), Some(&t::number()));
        assert_eq!(v.entry("x", &arr), None);
    }
}
