//! Error types for version records and the version DAG.

use arbor_diff::DiffError;
use arbor_query::QueryError;
use arbor_store::StoreError;
use arbor_tree::TreeError;
use arbor_types::{ContentHash, ErrorClass};

/// Errors that can occur while building, loading, or walking versions.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// A version that had to exist is missing from the store.
    #[error("version not found: {0}")]
    NotFound(ContentHash),

    /// The inputs do not describe a valid version.
    #[error("invalid version: {0}")]
    Invalid(String),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("query error: {0}")]
    Query(QueryError),
}

impl VersionError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Invalid(_) => ErrorClass::Usage,
            Self::Tree(e) => e.class(),
            Self::Diff(e) => e.class(),
            Self::Store(e) => e.class(),
            Self::Query(e) => e.class(),
        }
    }
}

impl From<StoreError> for VersionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(hash) => Self::NotFound(hash),
            other => Self::Store(other),
        }
    }
}

impl From<QueryError> for VersionError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::NotFound(hash) => Self::NotFound(hash),
            QueryError::Store(e) => Self::from(e),
            QueryError::Aborted(inner) => match inner.downcast::<VersionError>() {
                Ok(version_error) => *version_error,
                Err(other) => Self::Query(QueryError::Aborted(other)),
            },
            other => Self::Query(other),
        }
    }
}

/// Convenience alias for version results.
pub type VersionResult<T> = Result<T, VersionError>;
