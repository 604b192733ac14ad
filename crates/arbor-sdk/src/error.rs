use thiserror::Error;

use arbor_types::ErrorClass;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// Another commit moved the branch while this one was being prepared.
    #[error("branch {0} moved during the commit")]
    HeadMoved(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] arbor_tree::TreeError),

    #[error("version error: {0}")]
    Version(#[from] arbor_version::VersionError),

    #[error("merge error: {0}")]
    Merge(#[from] arbor_merge::MergeError),

    #[error("branch error: {0}")]
    Branch(#[from] arbor_branch::BranchError),

    #[error("reference error: {0}")]
    Ref(#[from] arbor_refs::RefError),

    #[error("id error: {0}")]
    Ids(#[from] arbor_types::TypeError),
}

impl SdkError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BranchNotFound(_) => ErrorClass::NotFound,
            Self::BranchExists(_) | Self::HeadMoved(_) | Self::Config(_) => ErrorClass::Usage,
            Self::Store(e) => e.class(),
            Self::Tree(e) => e.class(),
            Self::Version(e) => e.class(),
            Self::Merge(e) => e.class(),
            Self::Branch(e) => e.class(),
            Self::Ref(e) => e.class(),
            Self::Ids(_) => ErrorClass::Usage,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
