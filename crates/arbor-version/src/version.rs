//! Immutable version records and the handle used to read them.
//!
//! A [`VersionData`] is created exactly once, at commit or merge time, and is
//! written to the store right away. Its content hash is the version's
//! identity. [`Version`] pairs that hash with the decoded record and the
//! store session it came from.
//!
//! # Operation log storage
//!
//! Short logs (at most [`INLINE_OPERATIONS_LIMIT`] operations by default) are
//! embedded in the record. Longer logs are written as a separate
//! [`OperationsList`] and only its hash is embedded. `number_of_operations`
//! is recorded either way.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use arbor_query::{BulkQuery, Value};
use arbor_store::{HashRef, ObjectCache, ObjectKind, StoredValue};
use arbor_tree::{Operation, Tree, TreeData};
use arbor_types::ContentHash;

use crate::compressor::OperationsCompressor;
use crate::error::{VersionError, VersionResult};

/// Logs with at most this many operations are stored inline.
pub const INLINE_OPERATIONS_LIMIT: usize = 10;

/// The stored record of a version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub tree: HashRef<TreeData>,
    /// Parent link of records written before `base_version` existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<HashRef<VersionData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<HashRef<VersionData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_version1: Option<HashRef<VersionData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_version2: Option<HashRef<VersionData>>,
    /// Inline log, with references localized to this version's tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<Operation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations_hash: Option<HashRef<OperationsList>>,
    pub number_of_operations: usize,
}

impl StoredValue for VersionData {
    const KIND: ObjectKind = ObjectKind::Version;
}

impl VersionData {
    /// The parent of a regular version, or the common base of a merge.
    pub fn base_version(&self) -> Option<HashRef<VersionData>> {
        self.base_version.or(self.previous_version)
    }

    pub fn is_merge(&self) -> bool {
        self.merged_version1.is_some()
    }

    /// The versions this one was derived from directly.
    pub fn parents(&self) -> Vec<HashRef<VersionData>> {
        if self.is_merge() {
            self.merged_version1
                .into_iter()
                .chain(self.merged_version2)
                .collect()
        } else {
            self.base_version().into_iter().collect()
        }
    }
}

/// An operation log stored outside its version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationsList {
    pub operations: Vec<Operation>,
}

impl StoredValue for OperationsList {
    const KIND: ObjectKind = ObjectKind::Operations;
}

/// A loaded version.
///
/// Equality is by content hash.
#[derive(Clone)]
pub struct Version {
    cache: Arc<ObjectCache>,
    hash: HashRef<VersionData>,
    data: Arc<VersionData>,
}

impl Version {
    /// Load the version stored under `hash`.
    pub fn load(cache: Arc<ObjectCache>, hash: HashRef<VersionData>) -> VersionResult<Self> {
        match hash.try_resolve(&cache)? {
            Some(data) => Ok(Self { cache, hash, data }),
            None => Err(VersionError::NotFound(hash.hash())),
        }
    }

    pub fn from_parts(
        cache: Arc<ObjectCache>,
        hash: HashRef<VersionData>,
        data: Arc<VersionData>,
    ) -> Self {
        Self { cache, hash, data }
    }

    pub fn hash(&self) -> HashRef<VersionData> {
        self.hash
    }

    pub fn content_hash(&self) -> ContentHash {
        self.hash.hash()
    }

    pub fn data(&self) -> &Arc<VersionData> {
        &self.data
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    pub fn id(&self) -> u64 {
        self.data.id
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.data.time
    }

    pub fn author(&self) -> Option<&str> {
        self.data.author.as_deref()
    }

    pub fn tree_ref(&self) -> HashRef<TreeData> {
        self.data.tree
    }

    /// Open the tree this version records.
    pub fn tree(&self) -> VersionResult<Tree> {
        Ok(Tree::load(Arc::clone(&self.cache), self.data.tree)?)
    }

    pub fn base_version_ref(&self) -> Option<HashRef<VersionData>> {
        self.data.base_version()
    }

    pub fn base_version(&self) -> VersionResult<Option<Version>> {
        self.load_link(self.data.base_version())
    }

    pub fn is_merge(&self) -> bool {
        self.data.is_merge()
    }

    pub fn merged_version1(&self) -> VersionResult<Option<Version>> {
        self.load_link(self.data.merged_version1)
    }

    pub fn merged_version2(&self) -> VersionResult<Option<Version>> {
        self.load_link(self.data.merged_version2)
    }

    fn load_link(&self, link: Option<HashRef<VersionData>>) -> VersionResult<Option<Version>> {
        link.map(|hash| Version::load(Arc::clone(&self.cache), hash))
            .transpose()
    }

    pub fn number_of_operations(&self) -> usize {
        self.data.number_of_operations
    }

    pub fn operations_inlined(&self) -> bool {
        self.data.operations.is_some()
    }

    /// The operation log, with local references expanded to global ones.
    pub fn operations(&self) -> VersionResult<Vec<Operation>> {
        let tree = self.data.tree.resolve(&self.cache)?;
        let globalize = |ops: &[Operation]| -> Vec<Operation> {
            ops.iter().map(|op| op.globalize(&tree.tree_id)).collect()
        };
        match (&self.data.operations, self.data.operations_hash) {
            (Some(ops), _) => Ok(globalize(ops)),
            (None, Some(list)) => Ok(globalize(&list.resolve(&self.cache)?.operations)),
            (None, None) => Ok(Vec::new()),
        }
    }

    /// This version followed by its base chain.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            cache: Arc::clone(&self.cache),
            first: Some(self.clone()),
            next: None,
            failed: false,
        }
    }

    /// Load up to `limit` versions of the base chain, starting with this one,
    /// with one store round trip per generation.
    pub fn ancestors_query(&self, limit: usize) -> VersionResult<Vec<Version>> {
        let query = BulkQuery::new(Arc::clone(&self.cache));
        let chain = walk_bases(
            query.clone(),
            Arc::clone(&self.cache),
            vec![self.clone()],
            limit.max(1),
        );
        Ok(chain.execute()?)
    }
}

fn walk_bases(
    query: BulkQuery,
    cache: Arc<ObjectCache>,
    chain: Vec<Version>,
    limit: usize,
) -> Value<Vec<Version>> {
    let next = chain.last().and_then(Version::base_version_ref);
    match next {
        Some(parent) if chain.len() < limit => {
            let q = query.clone();
            query.get_required(parent).map_bulk(move |data| {
                let mut chain = chain;
                chain.push(Version::from_parts(Arc::clone(&cache), parent, data));
                walk_bases(q, cache, chain, limit)
            })
        }
        _ => query.constant(chain),
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Version {}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Version")
            .field("id", &self.data.id)
            .field("hash", &self.hash)
            .finish()
    }
}

/// Iterator over a version and its base chain.
pub struct Ancestors {
    cache: Arc<ObjectCache>,
    first: Option<Version>,
    next: Option<HashRef<VersionData>>,
    failed: bool,
}

impl Iterator for Ancestors {
    type Item = VersionResult<Version>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(first) = self.first.take() {
            self.next = first.base_version_ref();
            return Some(Ok(first));
        }
        let hash = self.next.take()?;
        match Version::load(Arc::clone(&self.cache), hash) {
            Ok(version) => {
                self.next = version.base_version_ref();
                Some(Ok(version))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builds and stores a new version.
///
/// ```ignore
/// let v2 = VersionBuilder::regular(ids.generate()?, tree)
///     .base(Some(&v1))
///     .author("alice")
///     .time(Utc::now())
///     .operations(ops)
///     .build()?;
/// ```
pub struct VersionBuilder {
    id: u64,
    tree: Tree,
    author: Option<String>,
    time: Option<DateTime<Utc>>,
    base: Option<HashRef<VersionData>>,
    merged: Option<(HashRef<VersionData>, HashRef<VersionData>)>,
    operations: Vec<Operation>,
    inline_limit: usize,
    compress: bool,
}

impl VersionBuilder {
    /// A regular commit of `tree`. Its log is compressed unless
    /// [`compress`](Self::compress) turns that off.
    pub fn regular(id: u64, tree: Tree) -> Self {
        Self {
            id,
            tree,
            author: None,
            time: None,
            base: None,
            merged: None,
            operations: Vec::new(),
            inline_limit: INLINE_OPERATIONS_LIMIT,
            compress: true,
        }
    }

    /// A merge of two versions descending from `base`.
    pub fn merge(
        id: u64,
        tree: Tree,
        base: &Version,
        merged1: &Version,
        merged2: &Version,
    ) -> Self {
        Self {
            base: Some(base.hash()),
            merged: Some((merged1.hash(), merged2.hash())),
            compress: false,
            ..Self::regular(id, tree)
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn base(mut self, base: Option<&Version>) -> Self {
        self.base = base.map(Version::hash);
        self
    }

    pub fn operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = operations.into_iter().collect();
        self
    }

    pub fn inline_limit(mut self, limit: usize) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Write the tree, the log, and the version record.
    pub fn build(self) -> VersionResult<Version> {
        if let Some((merged1, merged2)) = self.merged {
            if merged1 == merged2 {
                return Err(VersionError::Invalid(format!(
                    "merge of version {merged1} with itself"
                )));
            }
        }

        let cache = Arc::clone(self.tree.cache());
        let tree_id = self.tree.tree_id().clone();
        let tree = self.tree.write()?;

        let operations = if self.compress {
            OperationsCompressor::new().compress(self.operations)
        } else {
            self.operations
        };
        let operations: Vec<Operation> = operations.iter().map(|op| op.localize(&tree_id)).collect();
        let number_of_operations = operations.len();
        let (inline, referenced) = if number_of_operations <= self.inline_limit {
            (Some(operations), None)
        } else {
            let list = HashRef::write(OperationsList { operations }, &cache)?;
            (None, Some(list))
        };

        let data = VersionData {
            id: self.id,
            time: self.time,
            author: self.author,
            tree,
            previous_version: None,
            base_version: self.base,
            merged_version1: self.merged.map(|(merged1, _)| merged1),
            merged_version2: self.merged.map(|(_, merged2)| merged2),
            operations: inline,
            operations_hash: referenced,
            number_of_operations,
        };
        let hash = HashRef::write(data, &cache)?;
        let data = hash.resolve(&cache)?;
        info!(
            id = data.id,
            hash = %hash.hash().short_hex(),
            operations = number_of_operations,
            inlined = data.operations.is_some(),
            merge = data.is_merge(),
            "created version"
        );
        Ok(Version::from_parts(cache, hash, data))
    }
}
