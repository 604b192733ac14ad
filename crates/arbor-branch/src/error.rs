//! Error types for branch transactions.

use arbor_tree::TreeError;
use arbor_types::{ErrorClass, TypeError};

/// Errors that can occur inside branch transactions.
#[derive(Debug, thiserror::Error)]
pub enum BranchError {
    /// The transaction was used in a way the branch does not allow.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("id error: {0}")]
    Ids(#[from] TypeError),
}

impl BranchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Usage(_) => ErrorClass::Usage,
            Self::Tree(e) => e.class(),
            Self::Ids(_) => ErrorClass::Usage,
        }
    }
}

/// Convenience alias for branch results.
pub type BranchResult<T> = Result<T, BranchError>;
