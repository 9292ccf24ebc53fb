use thiserror::Error;

use crate::id::DocumentId;
use crate::value::NodeId;

/// A field value rejected by its validator.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema violation at {kind}.{field}: expected {expected}, found {found}")]
pub struct SchemaViolation {
    pub kind: String,
    pub field: String,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("kind {0} is defined more than once")]
    DuplicateKind(String),
    #[error("kind {kind} extends unknown kind {parent}")]
    UnknownParent { kind: String, parent: String },
    #[error("inheritance cycle through kind {0}")]
    InheritanceCycle(String),
    #[error("alias {alias} of {kind} collides with an existing kind or alias")]
    AliasConflict { kind: String, alias: String },
    #[error("field {kind}.{field} references unknown kind {target}")]
    UnknownFieldKind {
        kind: String,
        field: String,
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),
    #[error("kind {0} is abstract and cannot be instantiated")]
    AbstractKind(String),
    #[error("unknown kind {0}")]
    UnknownKind(String),
    #[error("unresolved reference to node {0}")]
    UnresolvedReference(NodeId),
    #[error("node {id} is still owned by {owner}")]
    CrossTreeReuse { id: NodeId, owner: DocumentId },
    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),
    #[error("invalid node id {0:?}")]
    InvalidId(String),
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("kind {kind} has no field {field}")]
    UnknownField { kind: String, field: String },
    #[error("field {kind}.{field} cannot be deleted")]
    FieldDeletion { kind: String, field: String },
    #[error("path not found")]
    PathNotFound,
    #[error("path does not point to a map")]
    NotMap,
    #[error("path does not point to an array")]
    NotArray,
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("node {0} is still reachable from the root")]
    NodeInUse(NodeId),
    #[error("document has no root")]
    NoRoot,
}

impl DocumentError {
    /// Attribute a violation raised by a bare validator to `kind.field`.
    /// Violations already attributed by a nested construction keep theirs.
    pub(crate) fn in_field(self, kind: &str, field: &str) -> Self {
        match self {
            Self::SchemaViolation(mut violation) if violation.kind.is_empty() => {
                violation.kind = kind.to_owned();
                violation.field = field.to_owned();
                Self::SchemaViolation(violation)
            }
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record {0} has no type")]
    MissingKind(String),
    #[error("unresolved reference to node {0}")]
    UnresolvedReference(NodeId),
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },
    #[error("graph has no root")]
    NoRoot,
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
}
