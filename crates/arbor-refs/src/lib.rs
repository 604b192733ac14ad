//! Node reference registry for arbor.
//!
//! A node reference is anything that can name a node: a tree-local id, a
//! `(tree, node)` pair, an opaque id from some external system. To keep
//! references in stored versions or hand them across process boundaries they
//! are turned into text of the form `prefix:body`.
//!
//! # Architecture
//!
//! - [`NodeReference`] is the object-safe trait every reference type
//!   implements.
//! - A [`NodeReferenceSerializer`] handles one or more reference types. A
//!   prefixed serializer is found by the reference's runtime type when
//!   serializing and by its prefix when deserializing.
//! - Serializers without a prefix are *legacy*: they are tried in
//!   registration order once prefix dispatch fails.
//! - [`ReferenceRegistry`] is an explicit object. Construct one per session
//!   and pass it to whoever needs (de)serialization.
//!
//! # Modules
//!
//! - [`error`] -- Error types for registration and dispatch
//! - [`reference`] -- The [`NodeReference`] trait and built-in reference types
//! - [`serializer`] -- The [`NodeReferenceSerializer`] trait and built-ins
//! - [`registry`] -- [`ReferenceRegistry`]

pub mod error;
pub mod reference;
pub mod registry;
pub mod serializer;

pub use error::{RefError, RefResult};
pub use reference::{NodeReference, NodeReferenceById, SerializedNodeReference};
pub use registry::{ReferenceRegistry, SharedSerializer, SEPARATOR};
pub use serializer::{ByIdSerializer, NodeRefSerializer, NodeReferenceSerializer};
