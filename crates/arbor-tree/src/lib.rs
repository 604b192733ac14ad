//! Persistent, content-addressed trees for arbor.
//!
//! A tree is a set of [`NodeData`] records indexed by [`NodeId`] through a
//! hash-array-mapped trie whose nodes are themselves stored values. Editing a
//! tree path-copies the trie, so every generation stays readable and
//! generations share all untouched objects.
//!
//! Edits are expressed as [`Operation`]s. Applying one to any
//! [`NodeTable`] (the persistent [`Tree`] or an in-memory [`TreeSnapshot`])
//! yields an [`AppliedOperation`] carrying the edits that undo it.
//!
//! [`NodeId`]: arbor_types::NodeId

pub mod error;
pub mod hamt;
pub mod node;
pub mod operation;
pub mod snapshot;
pub mod table;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use hamt::{TrieNode, TrieSlot};
pub use node::NodeData;
pub use operation::{AppliedOperation, NoRevert, Operation, RevertResolver};
pub use snapshot::TreeSnapshot;
pub use table::NodeTable;
pub use tree::{Tree, TreeData};
