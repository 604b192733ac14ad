use arbor_types::{ContentHash, ErrorClass};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A value that had to exist was not found.
    #[error("object not found: {0}")]
    NotFound(ContentHash),

    /// Content hash mismatch on read (data corruption).
    #[error("hash mismatch for {id}: computed {computed}")]
    HashMismatch {
        id: ContentHash,
        computed: ContentHash,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object data is malformed or of the wrong kind.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ContentHash, reason: String },

    /// Attempted to write an object whose hash is the null hash.
    #[error("cannot store object with null hash")]
    NullHash,

    /// The backing store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::HashMismatch { .. } | Self::Serialization(_) | Self::CorruptObject { .. } => {
                ErrorClass::Corruption
            }
            Self::NullHash => ErrorClass::Usage,
            Self::Unavailable(_) | Self::Io(_) => ErrorClass::Io,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let id = ContentHash::from_bytes(b"x");
        assert_eq!(StoreError::NotFound(id).class(), ErrorClass::NotFound);
        assert_eq!(
            StoreError::HashMismatch { id, computed: id }.class(),
            ErrorClass::Corruption
        );
        assert_eq!(
            StoreError::Unavailable("timeout".into()).class(),
            ErrorClass::Io
        );
        assert!(StoreError::Unavailable("timeout".into()).class().is_retryable());
    }
}
