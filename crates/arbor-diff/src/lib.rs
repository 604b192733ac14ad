//! Structural diff for arbor trees.
//!
//! [`diff_snapshots`] computes an operation list that turns one tree into
//! another; replaying it on the old tree gives a tree equal to the new one.
//! It is what revert operations and three-way merges are built on.

pub mod error;
pub mod tree_diff;

pub use error::{DiffError, DiffResult};
pub use tree_diff::{diff_snapshots, diff_trees};
