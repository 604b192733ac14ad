//! Tree operations: the typed, reversible edits a version records.

use std::fmt;

use serde::{Deserialize, Serialize};

use arbor_types::{ContentHash, NodeId, NodeRef, TreeId};

use crate::error::{TreeError, TreeResult};
use crate::node::NodeData;
use crate::table::NodeTable;

/// A single edit.
///
/// Child indices count positions in the target list as it is after the
/// edited node has been detached from its old place. An index of `None`
/// appends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SetProperty {
        node: NodeId,
        role: String,
        value: Option<String>,
    },
    AddNewChild {
        parent: NodeId,
        role: String,
        index: Option<usize>,
        child: NodeId,
        concept: Option<String>,
    },
    /// Delete a node without children.
    DeleteNode { node: NodeId },
    MoveNode {
        node: NodeId,
        parent: NodeId,
        role: String,
        index: Option<usize>,
    },
    SetReference {
        node: NodeId,
        role: String,
        target: Option<NodeRef>,
    },
    /// Make the tree match the tree of version `to`, starting from the tree
    /// of version `from`.
    RevertTo { from: ContentHash, to: ContentHash },
}

/// Expands [`Operation::RevertTo`] into concrete edits.
pub trait RevertResolver {
    /// Edits turning the tree of version `from` into the tree of version
    /// `to`.
    fn revert_operations(&self, from: ContentHash, to: ContentHash) -> TreeResult<Vec<Operation>>;
}

/// Resolver for contexts without version history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRevert;

impl RevertResolver for NoRevert {
    fn revert_operations(&self, from: ContentHash, to: ContentHash) -> TreeResult<Vec<Operation>> {
        Err(TreeError::RevertUnsupported { from, to })
    }
}

/// An operation that was applied, together with the edits that undo it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedOperation {
    pub operation: Operation,
    pub inverse: Vec<Operation>,
}

impl AppliedOperation {
    /// Edits that undo this one, in application order.
    pub fn inverse(&self) -> &[Operation] {
        &self.inverse
    }
}

impl Operation {
    /// The node this operation edits, if it edits exactly one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::SetProperty { node, .. }
            | Self::DeleteNode { node }
            | Self::MoveNode { node, .. }
            | Self::SetReference { node, .. } => Some(*node),
            Self::AddNewChild { child, .. } => Some(*child),
            Self::RevertTo { .. } => None,
        }
    }

    /// Replace global references into `tree` with their local form.
    pub fn localize(&self, tree: &TreeId) -> Self {
        self.map_target(|target| target.localize(tree))
    }

    /// Expand local references into global references into `tree`.
    pub fn globalize(&self, tree: &TreeId) -> Self {
        self.map_target(|target| target.globalize(tree))
    }

    fn map_target(&self, f: impl FnOnce(&NodeRef) -> NodeRef) -> Self {
        match self {
            Self::SetReference {
                node,
                role,
                target: Some(target),
            } => Self::SetReference {
                node: *node,
                role: role.clone(),
                target: Some(f(target)),
            },
            other => other.clone(),
        }
    }

    /// Apply the edit to `table`.
    ///
    /// On error the table may hold part of a [`RevertTo`](Self::RevertTo)
    /// expansion; callers that need atomicity apply to a copy.
    pub fn apply(
        &self,
        table: &mut dyn NodeTable,
        resolver: &dyn RevertResolver,
    ) -> TreeResult<AppliedOperation> {
        let inverse = match self {
            Self::SetProperty { node, role, value } => {
                let mut data = owned(table, *node)?;
                let old = match value {
                    Some(v) => data.properties.insert(role.clone(), v.clone()),
                    None => data.properties.remove(role),
                };
                table.put(data)?;
                vec![Self::SetProperty {
                    node: *node,
                    role: role.clone(),
                    value: old,
                }]
            }
            Self::SetReference { node, role, target } => {
                let mut data = owned(table, *node)?;
                let old = match target {
                    Some(t) => data.references.insert(role.clone(), t.clone()),
                    None => data.references.remove(role),
                };
                table.put(data)?;
                vec![Self::SetReference {
                    node: *node,
                    role: role.clone(),
                    target: old,
                }]
            }
            Self::AddNewChild {
                parent,
                role,
                index,
                child,
                concept,
            } => {
                if table.contains(*child)? {
                    return Err(TreeError::NodeExists(*child));
                }
                let mut parent_data = owned(table, *parent)?;
                attach(&mut parent_data, role, *child, *index)?;
                let mut child_data = NodeData::new(*child, concept.clone());
                child_data.parent = Some(*parent);
                child_data.role_in_parent = Some(role.clone());
                table.put(parent_data)?;
                table.put(child_data)?;
                vec![Self::DeleteNode { node: *child }]
            }
            Self::DeleteNode { node } => {
                if node.is_root() {
                    return Err(TreeError::RootImmutable);
                }
                let data = table.require(*node)?;
                if data.has_children() {
                    return Err(TreeError::NotALeaf(*node));
                }
                let (parent, role) = position(&data)?;
                let mut parent_data = owned(table, parent)?;
                let index = detach(&mut parent_data, &role, *node)?;
                table.put(parent_data)?;
                table.remove(*node)?;

                let mut inverse = vec![Self::AddNewChild {
                    parent,
                    role,
                    index: Some(index),
                    child: *node,
                    concept: data.concept.clone(),
                }];
                inverse.extend(data.properties.iter().map(|(role, value)| {
                    Self::SetProperty {
                        node: *node,
                        role: role.clone(),
                        value: Some(value.clone()),
                    }
                }));
                inverse.extend(data.references.iter().map(|(role, target)| {
                    Self::SetReference {
                        node: *node,
                        role: role.clone(),
                        target: Some(target.clone()),
                    }
                }));
                inverse
            }
            Self::MoveNode {
                node,
                parent: new_parent,
                role: new_role,
                index,
            } => {
                if node.is_root() {
                    return Err(TreeError::RootImmutable);
                }
                let mut data = owned(table, *node)?;
                let mut cursor = Some(*new_parent);
                while let Some(ancestor) = cursor {
                    if ancestor == *node {
                        return Err(TreeError::CyclicMove {
                            node: *node,
                            parent: *new_parent,
                        });
                    }
                    cursor = table.require(ancestor)?.parent;
                }

                let (old_parent, old_role) = position(&data)?;
                let mut old_parent_data = owned(table, old_parent)?;
                let old_index = detach(&mut old_parent_data, &old_role, *node)?;
                if old_parent == *new_parent {
                    attach(&mut old_parent_data, new_role, *node, *index)?;
                    table.put(old_parent_data)?;
                } else {
                    let mut new_parent_data = owned(table, *new_parent)?;
                    attach(&mut new_parent_data, new_role, *node, *index)?;
                    table.put(old_parent_data)?;
                    table.put(new_parent_data)?;
                }
                data.parent = Some(*new_parent);
                data.role_in_parent = Some(new_role.clone());
                table.put(data)?;

                vec![Self::MoveNode {
                    node: *node,
                    parent: old_parent,
                    role: old_role,
                    index: Some(old_index),
                }]
            }
            Self::RevertTo { from, to } => {
                let mut undo: Vec<Vec<Operation>> = Vec::new();
                for step in resolver.revert_operations(*from, *to)? {
                    undo.push(step.apply(table, resolver)?.inverse);
                }
                undo.into_iter().rev().flatten().collect()
            }
        };
        Ok(AppliedOperation {
            operation: self.clone(),
            inverse,
        })
    }
}

fn owned(table: &dyn NodeTable, id: NodeId) -> TreeResult<NodeData> {
    table.require(id).map(|data| (*data).clone())
}

fn position(data: &NodeData) -> TreeResult<(NodeId, String)> {
    match (data.parent, &data.role_in_parent) {
        (Some(parent), Some(role)) => Ok((parent, role.clone())),
        _ => Err(TreeError::Corrupt(format!("node {} has no parent", data.id))),
    }
}

fn attach(parent: &mut NodeData, role: &str, child: NodeId, index: Option<usize>) -> TreeResult<()> {
    let list = parent.children.entry(role.to_string()).or_default();
    let len = list.len();
    let at = index.unwrap_or(len);
    if at > len {
        if list.is_empty() {
            parent.children.remove(role);
        }
        return Err(TreeError::IndexOutOfRange {
            parent: parent.id,
            role: role.to_string(),
            index: at,
            len,
        });
    }
    list.insert(at, child);
    Ok(())
}

fn detach(parent: &mut NodeData, role: &str, child: NodeId) -> TreeResult<usize> {
    let index = parent
        .children
        .get(role)
        .and_then(|list| list.iter().position(|c| *c == child))
        .ok_or_else(|| {
            TreeError::Corrupt(format!(
                "{child} is not listed under role {role:?} of {}",
                parent.id
            ))
        })?;
    if let Some(list) = parent.children.get_mut(role) {
        list.remove(index);
        if list.is_empty() {
            parent.children.remove(role);
        }
    }
    Ok(index)
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetProperty { node, role, value } => match value {
                Some(v) => write!(f, "set {node}.{role} = {v:?}"),
                None => write!(f, "unset {node}.{role}"),
            },
            Self::AddNewChild {
                parent,
                role,
                index,
                child,
                ..
            } => write!(f, "add {child} to {parent}.{role}[{}]", fmt_index(*index)),
            Self::DeleteNode { node } => write!(f, "delete {node}"),
            Self::MoveNode {
                node,
                parent,
                role,
                index,
            } => write!(f, "move {node} to {parent}.{role}[{}]", fmt_index(*index)),
            Self::SetReference { node, role, target } => match target {
                Some(t) => write!(f, "ref {node}.{role} -> {t:?}"),
                None => write!(f, "unref {node}.{role}"),
            },
            Self::RevertTo { from, to } => {
                write!(f, "revert {} to {}", from.short_hex(), to.short_hex())
            }
        }
    }
}

fn fmt_index(index: Option<usize>) -> String {
    index.map_or_else(|| "end".to_string(), |i| i.to_string())
}
