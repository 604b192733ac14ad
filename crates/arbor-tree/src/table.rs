use std::sync::Arc;

use arbor_types::NodeId;

use crate::error::{TreeError, TreeResult};
use crate::node::NodeData;

/// Mutable id → node mapping that operations are applied to.
///
/// Implemented by the persistent [`Tree`](crate::Tree) and by the in-memory
/// [`TreeSnapshot`](crate::TreeSnapshot).
pub trait NodeTable {
    fn node(&self, id: NodeId) -> TreeResult<Option<Arc<NodeData>>>;

    /// Insert or replace the record for `node.id`.
    fn put(&mut self, node: NodeData) -> TreeResult<()>;

    /// Remove a record. Removing an absent id is an error.
    fn remove(&mut self, id: NodeId) -> TreeResult<()>;

    fn require(&self, id: NodeId) -> TreeResult<Arc<NodeData>> {
        self.node(id)?.ok_or(TreeError::NodeNotFound(id))
    }

    fn contains(&self, id: NodeId) -> TreeResult<bool> {
        Ok(self.node(id)?.is_some())
    }
}
