//! Foundation types for arbor.
//!
//! This crate provides the identity and addressing types used throughout the
//! arbor workspace. Every other arbor crate depends on `arbor-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`NodeId`] -- Tree-local node identity; [`NodeId::ROOT`] is the fixed root
//! - [`TreeId`] -- Stable identifier of a tree across its edits
//! - [`NodeRef`] -- Local, global, or foreign reference to a node
//! - [`IdGenerator`] -- Per-client monotonic id source for node and version ids
//! - [`ErrorClass`] -- Error taxonomy shared by every crate's error type

pub mod class;
pub mod error;
pub mod hash;
pub mod id_gen;
pub mod node;

pub use class::ErrorClass;
pub use error::TypeError;
pub use hash::ContentHash;
pub use id_gen::IdGenerator;
pub use node::{NodeId, NodeRef, TreeId};
