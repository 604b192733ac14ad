//! Transactional branches for arbor.
//!
//! A [`Branch`] wraps one tree and hands it out through transactions:
//! [`ReadTransaction`]s run concurrently on a consistent view, while a
//! [`WriteTransaction`] has exclusive access and commits only if its closure
//! succeeds. [`OtBranch`] additionally records every committed operation so
//! the edits can be turned into a version.
//!
//! ```ignore
//! let child = branch.compute_write(|tx| {
//!     tx.set_property(NodeId::ROOT, "name", Some("Foo".into()))?;
//!     tx.add_new_child(NodeId::ROOT, "items", None, Some("Item".into()))
//! })?;
//! let name = branch.compute_read(|tx| tx.property(NodeId::ROOT, "name"))?;
//! ```

pub mod branch;
pub mod error;
pub mod transaction;

pub use branch::{Branch, OtBranch};
pub use error::{BranchError, BranchResult};
pub use transaction::{ReadAccess, ReadTransaction, WriteTransaction};
