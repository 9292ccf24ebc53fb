use indexmap::IndexMap;

use crate::node::Node;
use crate::value::NodeId;

/// Id-keyed node storage of one document, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    nodes: IndexMap<NodeId, Node>,
}

impl Arena {
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(Node::kind)
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id().clone(), node);
    }

    pub fn remove(&mut self, id: &str) -> Option<Node> {
        self.nodes.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(|id, _| keep(id));
    }
}
