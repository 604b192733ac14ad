//! Error types for merging versions.

use arbor_diff::DiffError;
use arbor_tree::TreeError;
use arbor_types::{ContentHash, ErrorClass, TypeError};
use arbor_version::VersionError;

/// Errors that can occur while merging two versions.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The two versions share no history.
    #[error("versions {left} and {right} have no common ancestor")]
    NoCommonAncestor {
        left: ContentHash,
        right: ContentHash,
    },

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("id error: {0}")]
    Ids(#[from] TypeError),
}

impl MergeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoCommonAncestor { .. } => ErrorClass::Usage,
            Self::Version(e) => e.class(),
            Self::Diff(e) => e.class(),
            Self::Tree(e) => e.class(),
            Self::Ids(_) => ErrorClass::Usage,
        }
    }
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
