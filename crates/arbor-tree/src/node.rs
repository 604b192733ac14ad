//! Node records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use arbor_store::{ObjectKind, StoredValue};
use arbor_types::{NodeId, NodeRef};

/// One node of a tree, stored as its own content-addressed value.
///
/// Children are kept per role in order. Empty roles are never stored, so two
/// nodes with the same content always have the same encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub concept: Option<String>,
    pub parent: Option<NodeId>,
    pub role_in_parent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, NodeRef>,
}

impl NodeData {
    pub fn new(id: NodeId, concept: Option<String>) -> Self {
        Self {
            id,
            concept,
            parent: None,
            role_in_parent: None,
            properties: BTreeMap::new(),
            children: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// The root node of an empty tree.
    pub fn root() -> Self {
        Self::new(NodeId::ROOT, None)
    }

    pub fn property(&self, role: &str) -> Option<&str> {
        self.properties.get(role).map(String::as_str)
    }

    pub fn reference(&self, role: &str) -> Option<&NodeRef> {
        self.references.get(role)
    }

    /// Children in `role`, in order.
    pub fn children_in(&self, role: &str) -> &[NodeId] {
        self.children.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All children, role by role.
    pub fn all_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().flatten().copied()
    }

    pub fn has_children(&self) -> bool {
        self.children.values().any(|c| !c.is_empty())
    }
}

impl StoredValue for NodeData {
    const KIND: ObjectKind = ObjectKind::Node;
}
