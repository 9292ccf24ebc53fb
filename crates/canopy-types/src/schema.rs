//! Node kinds and the registry that resolves them.
//!
//! Definitions are collected by a [`RegistryBuilder`] in any order and
//! checked as a whole by [`RegistryBuilder::build`]. Inheritance is resolved
//! once there: every [`Schema`] carries its effective field list and its
//! ancestor chain, so lookups never walk `extends` at runtime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{DocumentError, SchemaError};
use crate::validator::Validator;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub validator: Validator,
}

/// Declarative description of one node kind.
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    kind: String,
    extends: Option<String>,
    is_abstract: bool,
    aliases: Vec<String>,
    fields: Vec<Field>,
}

impl SchemaDefinition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            extends: None,
            is_abstract: false,
            aliases: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn abstract_kind(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, validator: Validator) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.validator = validator,
            None => self.fields.push(Field { name, validator }),
        }
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// A registered kind with inheritance already resolved.
#[derive(Debug, Clone)]
pub struct Schema {
    kind: String,
    extends: Option<String>,
    is_abstract: bool,
    aliases: Vec<String>,
    fields: IndexMap<String, Field>,
    ancestors: Vec<String>,
}

impl Schema {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Effective fields, ancestor-first.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Ancestor kinds, nearest first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<SchemaDefinition>,
}

impl RegistryBuilder {
    pub fn define(mut self, definition: SchemaDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        let mut defs: IndexMap<String, SchemaDefinition> = IndexMap::new();
        for def in self.definitions {
            if defs.contains_key(&def.kind) {
                return Err(SchemaError::DuplicateKind(def.kind));
            }
            defs.insert(def.kind.clone(), def);
        }

        let mut aliases: HashMap<String, String> = HashMap::new();
        for def in defs.values() {
            for alias in &def.aliases {
                if defs.contains_key(alias) || aliases.contains_key(alias) {
                    return Err(SchemaError::AliasConflict {
                        kind: def.kind.clone(),
                        alias: alias.clone(),
                    });
                }
                aliases.insert(alias.clone(), def.kind.clone());
            }
        }

        let mut schemas = IndexMap::with_capacity(defs.len());
        for def in defs.values() {
            let ancestors = ancestor_chain(def, &defs)?;
            let mut fields: IndexMap<String, Field> = IndexMap::new();
            for ancestor in ancestors.iter().rev() {
                for field in &defs[ancestor.as_str()].fields {
                    fields.insert(field.name.clone(), field.clone());
                }
            }
            for field in &def.fields {
                fields.insert(field.name.clone(), field.clone());
            }
            schemas.insert(
                def.kind.clone(),
                Arc::new(Schema {
                    kind: def.kind.clone(),
                    extends: def.extends.clone(),
                    is_abstract: def.is_abstract,
                    aliases: def.aliases.clone(),
                    fields,
                    ancestors,
                }),
            );
        }

        let registry = SchemaRegistry { schemas, aliases };
        for schema in registry.schemas.values() {
            for field in schema.fields() {
                let mut targets = Vec::new();
                field.validator.referenced_kinds(&mut targets);
                if let Some(target) = targets.into_iter().find(|t| !registry.contains(t)) {
                    return Err(SchemaError::UnknownFieldKind {
                        kind: schema.kind.clone(),
                        field: field.name.clone(),
                        target: target.to_owned(),
                    });
                }
            }
        }
        Ok(registry)
    }
}

fn ancestor_chain(
    def: &SchemaDefinition,
    defs: &IndexMap<String, SchemaDefinition>,
) -> Result<Vec<String>, SchemaError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([def.kind.as_str()]);
    let mut current = def;
    while let Some(parent) = current.extends.as_deref() {
        let next = defs.get(parent).ok_or_else(|| SchemaError::UnknownParent {
            kind: current.kind.clone(),
            parent: parent.to_owned(),
        })?;
        if !seen.insert(next.kind.as_str()) {
            return Err(SchemaError::InheritanceCycle(def.kind.clone()));
        }
        chain.push(next.kind.clone());
        current = next;
    }
    Ok(chain)
}

/// Immutable set of registered kinds, shared by documents through `Arc`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<Schema>>,
    aliases: HashMap<String, String>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Canonical kind name for a kind or alias.
    pub fn resolve_kind<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if let Some((kind, _)) = self.schemas.get_key_value(name) {
            return Some(kind);
        }
        self.aliases.get(name).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Schema>, DocumentError> {
        self.resolve_kind(name)
            .and_then(|kind| self.schemas.get(kind))
            .ok_or_else(|| DocumentError::UnknownKind(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve_kind(name).is_some()
    }

    /// Whether `kind` is `ancestor` or inherits from it. Both accept aliases.
    pub fn is_a(&self, kind: &str, ancestor: &str) -> bool {
        let (Ok(schema), Some(ancestor)) = (self.get(kind), self.resolve_kind(ancestor)) else {
            return false;
        };
        schema.kind == ancestor || schema.ancestors.iter().any(|a| a == ancestor)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
