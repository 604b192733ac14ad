//! Node identities and node references.
//!
//! A [`NodeId`] is only meaningful inside one tree. A [`NodeRef`] is what a
//! reference role stores: either a tree-local id (the compact form used inside
//! stored versions), a global `(tree, node)` pair, or a reference of some other
//! kind kept in its serialized text form.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Tree-local node identity.
///
/// Ids are unique within one tree generation. [`NodeId::ROOT`] is the fixed
/// sentinel id of every tree's root node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: Self = Self(1);

    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the root sentinel.
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// Parse the hex text form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| TypeError::InvalidNodeId(s.to_string()))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:x})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stable identifier of a tree.
///
/// A tree keeps its id across edits: every generation produced from it by
/// path-copying carries the same `TreeId`. Global node references name the
/// tree they point into by this id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeId(String);

impl TreeId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-ordered identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to a node, as stored in a reference role.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeRef {
    /// A node in the same tree as the referencing node.
    Local(NodeId),
    /// A node in a named tree.
    Global { tree: TreeId, node: NodeId },
    /// Any other reference, kept in its registry-serialized text form.
    Foreign(String),
}

impl NodeRef {
    /// Convenience constructor for a global reference.
    pub fn global(tree: TreeId, node: NodeId) -> Self {
        Self::Global { tree, node }
    }

    /// Returns `true` for the tree-local form.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The referenced node id, if this reference names one directly.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Local(node) | Self::Global { node, .. } => Some(*node),
            Self::Foreign(_) => None,
        }
    }

    /// Resolve a local reference against the tree it was read from.
    pub fn globalize(&self, tree: &TreeId) -> Self {
        match self {
            Self::Local(node) => Self::Global {
                tree: tree.clone(),
                node: *node,
            },
            other => other.clone(),
        }
    }

    /// Shrink a global reference into the local form if it points into `tree`.
    pub fn localize(&self, tree: &TreeId) -> Self {
        match self {
            Self::Global { tree: target, node } if target == tree => Self::Local(*node),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_one() {
        assert_eq!(NodeId::ROOT.raw(), 1);
        assert!(NodeId::ROOT.is_root());
        assert!(!NodeId::new(2).is_root());
    }

    #[test]
    fn node_id_hex_text() {
        let id = NodeId::new(0x1_0000_002a);
        assert_eq!(id.to_string(), "10000002a");
        assert_eq!(NodeId::from_hex("10000002a").unwrap(), id);
        assert!(matches!(
            NodeId::from_hex("xyz"),
            Err(TypeError::InvalidNodeId(_))
        ));
    }

    #[test]
    fn generated_tree_ids_differ() {
        assert_ne!(TreeId::generate(), TreeId::generate());
    }

    #[test]
    fn localize_only_matching_tree() {
        let here = TreeId::new("here");
        let there = TreeId::new("there");
        let own = NodeRef::global(here.clone(), NodeId::new(7));
        let other = NodeRef::global(there, NodeId::new(7));

        assert_eq!(own.localize(&here), NodeRef::Local(NodeId::new(7)));
        assert_eq!(other.localize(&here), other);
    }

    #[test]
    fn globalize_inverts_localize() {
        let tree = TreeId::new("t");
        let global = NodeRef::global(tree.clone(), NodeId::new(9));
        assert_eq!(global.localize(&tree).globalize(&tree), global);
        let foreign = NodeRef::Foreign("id:abc".into());
        assert_eq!(foreign.globalize(&tree), foreign);
        assert_eq!(foreign.node_id(), None);
    }
}
