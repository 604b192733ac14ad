use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_types::NodeId;

use crate::error::{TreeError, TreeResult};
use crate::node::NodeData;
use crate::table::NodeTable;

/// A fully loaded tree, held in memory.
///
/// Two snapshots are equal when they hold the same nodes with the same
/// content; the tree id is not part of the comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    nodes: BTreeMap<NodeId, Arc<NodeData>>,
}

impl TreeSnapshot {
    /// A snapshot holding only the root node.
    pub fn new() -> Self {
        Self::from_nodes([NodeData::root()])
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeData>) -> Self {
        Self {
            nodes: nodes
                .into_iter()
                .map(|node| (node.id, Arc::new(node)))
                .collect(),
        }
    }

    pub(crate) fn from_shared(nodes: BTreeMap<NodeId, Arc<NodeData>>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn root(&self) -> Option<&NodeData> {
        self.get(NodeId::ROOT)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeData> {
        self.nodes.values().map(Arc::as_ref)
    }

    /// `start` and everything below it, parents before children, each
    /// parent's children in role then list order.
    pub fn descendants(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if let Some(node) = self.get(id) {
                order.push(id);
                queue.extend(node.all_children());
            }
        }
        order
    }
}

impl NodeTable for TreeSnapshot {
    fn node(&self, id: NodeId) -> TreeResult<Option<Arc<NodeData>>> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn put(&mut self, node: NodeData) -> TreeResult<()> {
        self.nodes.insert(node.id, Arc::new(node));
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> TreeResult<()> {
        self.nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(TreeError::NodeNotFound(id))
    }
}
