//! Versions and the version DAG for arbor.
//!
//! A [`Version`] is an immutable, content-addressed record of one tree state:
//! a reference to the tree, its parent links, and the operation log that
//! produced it. Regular commits have one parent (`base_version`); merges
//! record both merged versions plus their common base.
//!
//! # Modules
//!
//! - [`version`] -- the stored record, the read handle, and
//!   [`VersionBuilder`].
//! - [`compressor`] -- drops superseded operations before a log is stored.
//! - [`history`] -- batched loading and [`LinearHistory`] across merges.
//! - [`revert`] -- resolves revert operations by diffing version trees.
//! - [`reachable`] -- every object a version keeps alive.

pub mod compressor;
pub mod error;
pub mod history;
pub mod reachable;
pub mod revert;
pub mod version;

pub use compressor::OperationsCompressor;
pub use error::{VersionError, VersionResult};
pub use history::{collect_versions, load_versions, LinearHistory};
pub use reachable::{collect_reachable, publish_version};
pub use revert::VersionRevertResolver;
pub use version::{
    Ancestors, OperationsList, Version, VersionBuilder, VersionData, INLINE_OPERATIONS_LIMIT,
};
