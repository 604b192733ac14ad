//! High-level SDK for arbor.
//!
//! [`Repository`] is the entry point for applications embedding arbor: it
//! owns one store session and a set of named branches, and turns edits made
//! in write transactions into versions.
//!
//! ```ignore
//! let repo = Repository::in_memory()?;
//! repo.init_branch("main")?;
//! let (v1, ()) = repo.commit("main", Some("alice"), |tx| {
//!     tx.set_property(NodeId::ROOT, "name", Some("Foo".into()))
//! })?;
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod repository;

pub use config::{ArborConfig, DEFAULT_CACHE_CAPACITY};
pub use error::{SdkError, SdkResult};
pub use history::HistoryEntry;
pub use repository::Repository;

// Re-export key types
pub use arbor_branch::{ReadAccess, ReadTransaction, WriteTransaction};
pub use arbor_merge::{Conflict, MergeOutcome};
pub use arbor_refs::{NodeReference, ReferenceRegistry};
pub use arbor_store::{InMemoryObjectStore, ObjectStore};
pub use arbor_tree::{NodeData, Operation, Tree};
pub use arbor_types::{ContentHash, ErrorClass, NodeId, NodeRef, TreeId};
pub use arbor_version::{Version, VersionData};
