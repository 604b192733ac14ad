//! Repository configuration.

use serde::{Deserialize, Serialize};

use arbor_query::DEFAULT_BATCH_SIZE;
use arbor_version::INLINE_OPERATIONS_LIMIT;

use crate::error::{SdkError, SdkResult};

/// Default bound on the decoded values a repository keeps cached.
pub const DEFAULT_CACHE_CAPACITY: usize = 65_536;

/// Settings for a [`Repository`](crate::Repository). Missing TOML keys take
/// their default values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArborConfig {
    /// Logs with at most this many operations are stored inside the version.
    pub inline_operations_limit: usize,
    /// Drop superseded operations before storing a commit.
    pub compress_operations: bool,
    /// Maximum number of keys per batch read.
    pub query_batch_size: usize,
    /// High 32 bits of every id this repository generates. Picked at random
    /// when unset.
    pub client_id: Option<u32>,
    /// Most decoded values the repository's store session keeps.
    pub cache_capacity: usize,
    /// Author recorded when a commit names none.
    pub default_author: Option<String>,
}

impl Default for ArborConfig {
    fn default() -> Self {
        Self {
            inline_operations_limit: INLINE_OPERATIONS_LIMIT,
            compress_operations: true,
            query_batch_size: DEFAULT_BATCH_SIZE,
            client_id: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            default_author: None,
        }
    }
}

impl ArborConfig {
    pub fn from_toml(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SdkResult<String> {
        toml::to_string(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.query_batch_size == 0 {
            return Err(SdkError::Config("query_batch_size must be positive".into()));
        }
        Ok(())
    }
}
