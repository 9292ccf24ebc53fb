//! Typed document graphs.
//!
//! Node kinds are declared in a [`SchemaRegistry`]; a [`Document`] holds an
//! arena of validated [`Node`]s, records every mutation as a [`Change`], and
//! converts to and from the flat [`FlattenedGraph`] form.

mod arena;
mod build;
pub mod builtin;
pub mod codec;
mod document;
mod error;
pub mod id;
mod node;
pub mod schema;
pub mod validator;
pub mod value;

pub use codec::{flatten, unflatten, FlattenedGraph, NodeRef};
pub use document::{
    Change, ChangeBatch, ChangeOp, ChangeOrigin, CloneOptions, Document, ListenerId, Target, Transaction,
};
pub use error::{CodecError, DocumentError, SchemaError, SchemaViolation};
pub use id::{generate_id, DocumentId, IdGenerator};
pub use node::Node;
pub use schema::{Field, RegistryBuilder, Schema, SchemaDefinition, SchemaRegistry};
pub use validator::{t, Primitive, Validator};
pub use value::{NodeId, PathStep, Value};
