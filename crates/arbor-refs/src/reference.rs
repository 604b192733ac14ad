//! The [`NodeReference`] trait and the reference types every registry knows.

use std::any::Any;
use std::fmt::Debug;

use arbor_types::NodeRef;

/// Something that names a node.
///
/// The trait is object-safe so a registry can dispatch on the runtime type
/// of a `&dyn NodeReference`. Implementations compare by value through
/// [`eq_ref`](Self::eq_ref).
pub trait NodeReference: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Value equality against a reference of possibly different type.
    fn eq_ref(&self, other: &dyn NodeReference) -> bool;

    fn clone_ref(&self) -> Box<dyn NodeReference>;
}

impl dyn NodeReference {
    /// The concrete reference, if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for dyn NodeReference {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ref(other)
    }
}

impl Clone for Box<dyn NodeReference> {
    fn clone(&self) -> Self {
        self.clone_ref()
    }
}

/// A reference by opaque external id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeReferenceById {
    pub id: String,
}

impl NodeReferenceById {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A reference that is already in text form.
///
/// Serializing one returns its text unchanged, whatever its prefix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SerializedNodeReference(pub String);

fn eq_same<T: PartialEq + Any>(this: &T, other: &dyn NodeReference) -> bool {
    other.as_any().downcast_ref::<T>() == Some(this)
}

impl NodeReference for NodeReferenceById {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_ref(&self, other: &dyn NodeReference) -> bool {
        eq_same(self, other)
    }

    fn clone_ref(&self) -> Box<dyn NodeReference> {
        Box::new(self.clone())
    }
}

impl NodeReference for SerializedNodeReference {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_ref(&self, other: &dyn NodeReference) -> bool {
        eq_same(self, other)
    }

    fn clone_ref(&self) -> Box<dyn NodeReference> {
        Box::new(self.clone())
    }
}

impl NodeReference for NodeRef {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_ref(&self, other: &dyn NodeReference) -> bool {
        eq_same(self, other)
    }

    fn clone_ref(&self) -> Box<dyn NodeReference> {
        Box::new(self.clone())
    }
}
