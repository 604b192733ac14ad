use arbor_store::StoreError;
use arbor_types::{ContentHash, ErrorClass};

/// Errors that abort a bulk query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A lookup declared as required found nothing.
    #[error("required value not found: {0}")]
    NotFound(ContentHash),

    /// The store failed, or fetched bytes failed to decode.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A continuation rejected its input.
    #[error("query aborted: {0}")]
    Aborted(Box<dyn std::error::Error + Send + Sync>),

    /// The graph ran to completion without producing the requested value.
    #[error("value was never resolved")]
    Unresolved,
}

impl QueryError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Store(e) => e.class(),
            Self::Aborted(_) | Self::Unresolved => ErrorClass::Usage,
        }
    }
}

/// Convenience alias for query results.
pub type QueryResult<T> = Result<T, QueryError>;
