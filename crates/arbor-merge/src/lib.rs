//! Merge engine for arbor.
//!
//! [`VersionMerger`] brings two versions of a model back together: it finds
//! their nearest common ancestor, replays the incoming side's changes on the
//! local side's tree, and records a merge version. When one side already
//! contains the other the merge is a fast-forward and no version is created.

pub mod error;
pub mod merger;

pub use error::{MergeError, MergeResult};
pub use merger::{Conflict, MergeOutcome, VersionMerger};
