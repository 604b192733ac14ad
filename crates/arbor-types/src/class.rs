use std::fmt;

/// Coarse classification of every failure arbor can report.
///
/// Each crate's error enum maps its variants onto one of these classes so
/// callers can decide uniformly what to do with a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A required hash, key, or version has no stored value.
    NotFound,
    /// Stored bytes do not decode, or do not match their hash.
    Corruption,
    /// The caller broke an API contract.
    Usage,
    /// The store transport failed or timed out.
    Io,
}

impl ErrorClass {
    /// Only transport failures may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::Corruption => write!(f, "corruption"),
            Self::Usage => write!(f, "usage"),
            Self::Io => write!(f, "io"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_is_retryable() {
        assert!(ErrorClass::Io.is_retryable());
        assert!(!ErrorClass::NotFound.is_retryable());
        assert!(!ErrorClass::Corruption.is_retryable());
        assert!(!ErrorClass::Usage.is_retryable());
    }

    #[test]
    fn display_names() {
        assert_eq!(ErrorClass::NotFound.to_string(), "not-found");
        assert_eq!(ErrorClass::Io.to_string(), "io");
    }
}
