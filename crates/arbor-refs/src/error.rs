//! Error types for reference registration and dispatch.

use thiserror::Error;

use arbor_types::ErrorClass;

/// Errors from the reference registry.
#[derive(Debug, Error)]
pub enum RefError {
    /// A prefix or reference type is already claimed and replacement was not
    /// requested.
    #[error("{what} already registered to {existing}")]
    RegistrationConflict { what: String, existing: String },

    /// No registered serializer handles the reference's type.
    #[error("no serializer found for {reference}")]
    MissingSerializer { reference: String },

    /// No registered deserializer accepts the text.
    #[error("no deserializer found for: {text}")]
    UnknownFormat { text: String },

    /// A deserializer claimed the text but could not parse it.
    #[error("malformed reference {text:?}: {reason}")]
    Malformed { text: String, reason: String },
}

impl RefError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RegistrationConflict { .. } | Self::MissingSerializer { .. } => ErrorClass::Usage,
            Self::UnknownFormat { .. } => ErrorClass::NotFound,
            Self::Malformed { .. } => ErrorClass::Corruption,
        }
    }
}

/// Convenience type alias for registry operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
