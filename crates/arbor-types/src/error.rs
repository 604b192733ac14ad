use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    /// Client `client_id` has handed out every sequence number it owns.
    #[error("id space of client {client_id} is exhausted")]
    IdSpaceExhausted { client_id: u32 },
}
