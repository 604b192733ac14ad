//! The [`NodeReferenceSerializer`] trait and the built-in serializers.

use std::any::TypeId;
use std::fmt::Debug;

use arbor_types::{NodeId, NodeRef, TreeId};

use crate::reference::{NodeReference, NodeReferenceById};

/// Converts references of some set of types to and from text.
///
/// A serializer that returns a [`prefix`](Self::prefix) produces and accepts
/// only the body after `prefix:`; the registry adds and strips the prefix.
/// A serializer without a prefix is legacy and sees the whole text.
pub trait NodeReferenceSerializer: Debug + Send + Sync {
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Runtime types this serializer is responsible for.
    fn supported_types(&self) -> Vec<TypeId> {
        Vec::new()
    }

    /// Text form of `reference`, or `None` if it is not handled here.
    fn serialize(&self, reference: &dyn NodeReference) -> Option<String>;

    /// Parse `text`, or `None` if it is not handled here.
    fn deserialize(&self, text: &str) -> Option<Box<dyn NodeReference>>;
}

/// `id:<external id>` for [`NodeReferenceById`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ByIdSerializer;

impl NodeReferenceSerializer for ByIdSerializer {
    fn prefix(&self) -> Option<&str> {
        Some("id")
    }

    fn supported_types(&self) -> Vec<TypeId> {
        vec![TypeId::of::<NodeReferenceById>()]
    }

    fn serialize(&self, reference: &dyn NodeReference) -> Option<String> {
        reference
            .downcast_ref::<NodeReferenceById>()
            .map(|r| r.id.clone())
    }

    fn deserialize(&self, text: &str) -> Option<Box<dyn NodeReference>> {
        Some(Box::new(NodeReferenceById::new(text)))
    }
}

/// `pnode:<hex id>` for local and `pnode:<hex id>@<tree id>` for global
/// [`NodeRef`]s.
///
/// A [`NodeRef::Foreign`] already holds serialized text, so it is not
/// handled here; the registry passes its text through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeRefSerializer;

impl NodeReferenceSerializer for NodeRefSerializer {
    fn prefix(&self) -> Option<&str> {
        Some("pnode")
    }

    fn supported_types(&self) -> Vec<TypeId> {
        vec![TypeId::of::<NodeRef>()]
    }

    fn serialize(&self, reference: &dyn NodeReference) -> Option<String> {
        match reference.downcast_ref::<NodeRef>()? {
            NodeRef::Local(node) => Some(node.to_string()),
            NodeRef::Global { tree, node } => Some(format!("{node}@{tree}")),
            NodeRef::Foreign(_) => None,
        }
    }

    fn deserialize(&self, text: &str) -> Option<Box<dyn NodeReference>> {
        let parsed = match text.split_once('@') {
            Some((node, tree)) if !tree.is_empty() => NodeRef::Global {
                tree: TreeId::new(tree),
                node: NodeId::from_hex(node).ok()?,
            },
            Some(_) => return None,
            None => NodeRef::Local(NodeId::from_hex(text).ok()?),
        };
        Some(Box::new(parsed))
    }
}
