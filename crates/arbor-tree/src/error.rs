//! Error types for tree reads and edits.

use arbor_query::QueryError;
use arbor_store::StoreError;
use arbor_types::{ContentHash, ErrorClass, NodeId};

/// Errors from tree reads and edits.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// An edit named a node that is not in the tree.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A new child was given an id that is already in use.
    #[error("node already exists: {0}")]
    NodeExists(NodeId),

    /// A child index was past the end of the target list.
    #[error("index {index} out of range for role {role:?} of {parent} (len {len})")]
    IndexOutOfRange {
        parent: NodeId,
        role: String,
        index: usize,
        len: usize,
    },

    /// Only nodes without children can be deleted.
    #[error("node {0} still has children")]
    NotALeaf(NodeId),

    /// A node cannot be moved below itself.
    #[error("cannot move {node} into its own subtree at {parent}")]
    CyclicMove { node: NodeId, parent: NodeId },

    /// The root node cannot be deleted or moved.
    #[error("the root node cannot be deleted or moved")]
    RootImmutable,

    /// No revert resolver is available for a revert operation.
    #[error("cannot revert from {from} to {to}: no resolver")]
    RevertUnsupported { from: ContentHash, to: ContentHash },

    /// Resolving a revert operation failed.
    #[error("cannot revert from {from} to {to}: {source}")]
    Revert {
        from: ContentHash,
        to: ContentHash,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The stored node index or a node record is inconsistent.
    #[error("corrupt tree: {0}")]
    Corrupt(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("query error: {0}")]
    Query(QueryError),
}

impl TreeError {
    /// Map this error onto the shared failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NodeNotFound(_)
            | Self::NodeExists(_)
            | Self::IndexOutOfRange { .. }
            | Self::NotALeaf(_)
            | Self::CyclicMove { .. }
            | Self::RootImmutable
            | Self::RevertUnsupported { .. } => ErrorClass::Usage,
            Self::Revert { .. } => ErrorClass::NotFound,
            Self::Corrupt(_) => ErrorClass::Corruption,
            Self::Store(e) => e.class(),
            Self::Query(e) => e.class(),
        }
    }
}

impl From<QueryError> for TreeError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Aborted(inner) => match inner.downcast::<TreeError>() {
                Ok(tree_error) => *tree_error,
                Err(other) => Self::Query(QueryError::Aborted(other)),
            },
            QueryError::Store(e) => Self::Store(e),
            other => Self::Query(other),
        }
    }
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
