//! Content-addressed value storage for arbor.
//!
//! Every persisted piece of a model -- node records, trie nodes of a tree's
//! node index, tree records, versions, operation lists -- is stored as an
//! immutable object keyed by the BLAKE3 hash of its bytes (domain-separated
//! by object kind).
//!
//! # Layers
//!
//! - [`ObjectStore`] -- the raw key/value substrate: single and batch reads,
//!   idempotent writes. [`InMemoryObjectStore`] is the `HashMap` backend;
//!   [`CountingObjectStore`] wraps any backend and counts calls;
//!   [`StagingObjectStore`] holds writes back until they are published.
//! - [`StoredValue`] -- a typed value with a fixed [`ObjectKind`] and a
//!   deterministic encoding.
//! - [`HashRef`] -- a typed, lazy pointer to a stored value.
//! - [`ObjectCache`] -- one store session: the store plus the cache of
//!   already-decoded values shared by every `HashRef` with the same hash.
//!   Sessions can be bounded, or opened as children of a longer-lived one.
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Reads of missing keys return `None`, never an error.
//! 3. Transport failures surface as [`StoreError::Unavailable`] or
//!    [`StoreError::Io`], never as a missing value.
//! 4. Decoding verifies the hash and kind of the fetched bytes.

pub mod cache;
pub mod counting;
pub mod error;
pub mod memory;
pub mod object;
pub mod reference;
pub mod staging;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::ObjectCache;
pub use counting::CountingObjectStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{ObjectKind, StoredObject, StoredValue};
pub use reference::HashRef;
pub use staging::StagingObjectStore;
pub use traits::ObjectStore;
