use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arbor_types::ContentHash;
use arbor_version::Version;

/// One row of a branch history listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub hash: ContentHash,
    pub id: u64,
    pub author: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub operations: usize,
    pub merge: bool,
    /// The merge version that brought this one into the branch, for versions
    /// listed under a merge.
    pub merged_by: Option<ContentHash>,
}

impl HistoryEntry {
    pub(crate) fn new(version: &Version, merged_by: Option<ContentHash>) -> Self {
        Self {
            hash: version.content_hash(),
            id: version.id(),
            author: version.author().map(str::to_owned),
            time: version.time(),
            operations: version.number_of_operations(),
            merge: version.is_merge(),
            merged_by,
        }
    }
}
