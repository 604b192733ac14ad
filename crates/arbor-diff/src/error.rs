//! Error types for the diff crate.

use arbor_tree::TreeError;
use arbor_types::ErrorClass;

/// Errors that can occur while diffing trees.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// The difference cannot be expressed as tree operations.
    #[error("unsupported change: {0}")]
    UnsupportedChange(String),

    /// Loading a tree or replaying an edit failed.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
}

impl DiffError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedChange(_) => ErrorClass::Usage,
            Self::Tree(e) => e.class(),
        }
    }
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
