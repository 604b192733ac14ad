//! Read and write views of a branch's tree.

use std::sync::Arc;

use arbor_tree::{AppliedOperation, NodeData, NodeTable, Operation, RevertResolver, Tree};
use arbor_types::{IdGenerator, NodeId, NodeRef};

use crate::error::BranchResult;

/// Queries shared by read and write transactions.
///
/// Every query on a node that does not exist fails with
/// [`TreeError::NodeNotFound`](arbor_tree::TreeError::NodeNotFound), except
/// [`contains_node`](Self::contains_node).
pub trait ReadAccess {
    /// The tree this transaction sees.
    fn tree(&self) -> &Tree;

    fn contains_node(&self, node: NodeId) -> BranchResult<bool> {
        Ok(self.tree().contains(node)?)
    }

    fn node(&self, node: NodeId) -> BranchResult<Arc<NodeData>> {
        Ok(self.tree().require(node)?)
    }

    fn concept(&self, node: NodeId) -> BranchResult<Option<String>> {
        Ok(self.node(node)?.concept.clone())
    }

    fn property(&self, node: NodeId, role: &str) -> BranchResult<Option<String>> {
        Ok(self.node(node)?.property(role).map(str::to_owned))
    }

    fn property_roles(&self, node: NodeId) -> BranchResult<Vec<String>> {
        Ok(self.node(node)?.properties.keys().cloned().collect())
    }

    fn children(&self, node: NodeId, role: &str) -> BranchResult<Vec<NodeId>> {
        Ok(self.node(node)?.children_in(role).to_vec())
    }

    /// Children of every role, roles in name order.
    fn all_children(&self, node: NodeId) -> BranchResult<Vec<NodeId>> {
        Ok(self.node(node)?.all_children().collect())
    }

    fn parent(&self, node: NodeId) -> BranchResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    fn role_in_parent(&self, node: NodeId) -> BranchResult<Option<String>> {
        Ok(self.node(node)?.role_in_parent.clone())
    }

    fn reference_target(&self, node: NodeId, role: &str) -> BranchResult<Option<NodeRef>> {
        Ok(self.node(node)?.reference(role).cloned())
    }

    fn reference_roles(&self, node: NodeId) -> BranchResult<Vec<String>> {
        Ok(self.node(node)?.references.keys().cloned().collect())
    }

    /// Every node below `node` in breadth-first order, optionally starting
    /// with `node` itself. Each level is fetched with one bulk read.
    fn descendants(&self, node: NodeId, include_self: bool) -> BranchResult<Vec<NodeId>> {
        let start = self.node(node)?;
        let mut found = Vec::new();
        if include_self {
            found.push(node);
        }
        let mut level: Vec<NodeId> = start.all_children().collect();
        while !level.is_empty() {
            found.extend_from_slice(&level);
            let records = self.tree().nodes(&level)?;
            level = records
                .into_iter()
                .flatten()
                .flat_map(|record| record.all_children().collect::<Vec<_>>())
                .collect();
        }
        Ok(found)
    }
}

/// A consistent, read-only view of a branch.
pub struct ReadTransaction {
    tree: Tree,
}

impl ReadTransaction {
    pub(crate) fn new(tree: Tree) -> Self {
        Self { tree }
    }
}

impl ReadAccess for ReadTransaction {
    fn tree(&self) -> &Tree {
        &self.tree
    }
}

/// An exclusive, editable view of a branch.
///
/// Edits go to a private copy of the tree. The branch adopts that copy only
/// when the transaction closure returns `Ok`.
pub struct WriteTransaction {
    tree: Tree,
    ids: Arc<IdGenerator>,
    resolver: Arc<dyn RevertResolver + Send + Sync>,
    applied: Vec<AppliedOperation>,
}

impl WriteTransaction {
    pub(crate) fn new(
        tree: Tree,
        ids: Arc<IdGenerator>,
        resolver: Arc<dyn RevertResolver + Send + Sync>,
    ) -> Self {
        Self {
            tree,
            ids,
            resolver,
            applied: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> (Tree, Vec<AppliedOperation>) {
        (self.tree, self.applied)
    }

    /// Apply any operation and record it.
    pub fn apply_operation(&mut self, operation: Operation) -> BranchResult<&AppliedOperation> {
        let applied = self.tree.apply(&operation, self.resolver.as_ref())?;
        self.applied.push(applied);
        let last = self.applied.len() - 1;
        Ok(&self.applied[last])
    }

    pub fn set_property(
        &mut self,
        node: NodeId,
        role: impl Into<String>,
        value: Option<String>,
    ) -> BranchResult<()> {
        self.apply_operation(Operation::SetProperty {
            node,
            role: role.into(),
            value,
        })?;
        Ok(())
    }

    /// Add a child with a freshly generated id and return that id. An index
    /// of `None` appends.
    pub fn add_new_child(
        &mut self,
        parent: NodeId,
        role: impl Into<String>,
        index: Option<usize>,
        concept: Option<String>,
    ) -> BranchResult<NodeId> {
        let child = self.ids.generate_node_id()?;
        self.add_new_child_with_id(parent, role, index, child, concept)?;
        Ok(child)
    }

    pub fn add_new_child_with_id(
        &mut self,
        parent: NodeId,
        role: impl Into<String>,
        index: Option<usize>,
        child: NodeId,
        concept: Option<String>,
    ) -> BranchResult<()> {
        self.apply_operation(Operation::AddNewChild {
            parent,
            role: role.into(),
            index,
            child,
            concept,
        })?;
        Ok(())
    }

    /// Move `child` into `parent.role` at `index`, counted without `child`.
    pub fn move_child(
        &mut self,
        parent: NodeId,
        role: impl Into<String>,
        index: Option<usize>,
        child: NodeId,
    ) -> BranchResult<()> {
        self.apply_operation(Operation::MoveNode {
            node: child,
            parent,
            role: role.into(),
            index,
        })?;
        Ok(())
    }

    /// Delete `node` and everything below it, deepest nodes first.
    pub fn delete_node(&mut self, node: NodeId) -> BranchResult<()> {
        let doomed = self.descendants(node, true)?;
        for id in doomed.into_iter().rev() {
            self.apply_operation(Operation::DeleteNode { node: id })?;
        }
        Ok(())
    }

    pub fn set_reference_target(
        &mut self,
        node: NodeId,
        role: impl Into<String>,
        target: Option<NodeRef>,
    ) -> BranchResult<()> {
        self.apply_operation(Operation::SetReference {
            node,
            role: role.into(),
            target,
        })?;
        Ok(())
    }

    /// Operations applied so far in this transaction.
    pub fn operations(&self) -> Vec<Operation> {
        self.applied.iter().map(|a| a.operation.clone()).collect()
    }

    pub fn applied(&self) -> &[AppliedOperation] {
        &self.applied
    }
}

impl ReadAccess for WriteTransaction {
    fn tree(&self) -> &Tree {
        &self.tree
    }
}
