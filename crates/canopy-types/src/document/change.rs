use crate::value::{NodeId, PathStep, Value};

/// Where a batch came from. Replays of remote edits are tagged `Remote` so
/// the sync engine never sends them back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeOrigin {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The document's root slot; the only key is `"root"`.
    Root,
    Node(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    Add {
        key: String,
        new_value: Value,
    },
    Update {
        key: String,
        old_value: Value,
        new_value: Value,
    },
    Delete {
        key: String,
        old_value: Value,
    },
    Splice {
        index: usize,
        removed_count: usize,
        added: Vec<Value>,
        removed: Vec<Value>,
    },
    Replace {
        index: usize,
        old_value: Value,
        new_value: Value,
    },
}

/// One recorded mutation. `path` addresses the container inside the target
/// node (empty for the node's own field table).
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub target: Target,
    pub path: Vec<PathStep>,
    pub op: ChangeOp,
}

impl Change {
    pub fn node(&self) -> Option<&NodeId> {
        match &self.target {
            Target::Node(id) => Some(id),
            Target::Root => None,
        }
    }

    /// Values this change wrote into the graph.
    pub fn written(&self) -> Vec<&Value> {
        match &self.op {
            ChangeOp::Add { new_value, .. }
            | ChangeOp::Update { new_value, .. }
            | ChangeOp::Replace { new_value, .. } => vec![new_value],
            ChangeOp::Splice { added, .. } => added.iter().collect(),
            ChangeOp::Delete { .. } => Vec::new(),
        }
    }

    /// Values this change overwrote or removed.
    pub fn dropped(&self) -> Vec<&Value> {
        match &self.op {
            ChangeOp::Update { old_value, .. }
            | ChangeOp::Delete { old_value, .. }
            | ChangeOp::Replace { old_value, .. } => vec![old_value],
            ChangeOp::Splice { removed, .. } => removed.iter().collect(),
            ChangeOp::Add { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub origin: ChangeOrigin,
    pub changes: Vec<Change>,
}
