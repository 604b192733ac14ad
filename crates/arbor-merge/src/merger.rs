//! Three-way merge of versions.
//!
//! The incoming side's changes since the common ancestor are computed as a
//! structural diff and replayed on top of the local side's tree. When both
//! sides wrote the same slot the incoming value wins. Incoming operations
//! that no longer apply are dropped and reported as [`Conflict`]s.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use arbor_diff::diff_trees;
use arbor_store::{HashRef, ObjectCache};
use arbor_tree::{NodeTable, Operation, Tree};
use arbor_types::{ContentHash, IdGenerator};
use arbor_version::{load_versions, Version, VersionBuilder, VersionData, VersionRevertResolver};

use crate::error::{MergeError, MergeResult};

/// An incoming operation that could not be applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub operation: Operation,
    pub reason: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.reason)
    }
}

/// What a merge produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// One side already contains the other; no version was created.
    FastForward(Version),
    /// A new merge version.
    Merged {
        version: Version,
        conflicts: Vec<Conflict>,
    },
}

impl MergeOutcome {
    /// The version the merged branch should point at.
    pub fn head(&self) -> &Version {
        match self {
            Self::FastForward(version) | Self::Merged { version, .. } => version,
        }
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Self::FastForward(_) => &[],
            Self::Merged { conflicts, .. } => conflicts,
        }
    }

    pub fn is_fast_forward(&self) -> bool {
        matches!(self, Self::FastForward(_))
    }
}

/// Merges versions of one repository.
///
/// The merged tree and the merge version are written through the merger's
/// cache. The merge version's id is greater than the ids of both sides.
pub struct VersionMerger {
    cache: Arc<ObjectCache>,
    ids: Arc<IdGenerator>,
    author: Option<String>,
}

impl VersionMerger {
    pub fn new(cache: Arc<ObjectCache>, ids: Arc<IdGenerator>) -> Self {
        Self {
            cache,
            ids,
            author: None,
        }
    }

    /// Record `author` on merge versions.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Merge `incoming` into `local`.
    pub fn merge(&self, local: &Version, incoming: &Version) -> MergeResult<MergeOutcome> {
        if local == incoming {
            return Ok(MergeOutcome::FastForward(local.clone()));
        }
        let base = self
            .common_ancestor(local, incoming)?
            .ok_or(MergeError::NoCommonAncestor {
                left: local.content_hash(),
                right: incoming.content_hash(),
            })?;
        if &base == incoming {
            return Ok(MergeOutcome::FastForward(local.clone()));
        }
        if &base == local {
            return Ok(MergeOutcome::FastForward(incoming.clone()));
        }

        let changes = diff_trees(&base.tree()?, &incoming.tree()?)?;
        let resolver = VersionRevertResolver::new(Arc::clone(&self.cache));
        let mut tree = Tree::load(Arc::clone(&self.cache), local.tree_ref())?;
        let mut applied = Vec::with_capacity(changes.len());
        let mut conflicts = Vec::new();
        for change in changes {
            let op = clamp_index(change, &tree)?;
            let mut attempt = tree.clone();
            match attempt.apply(&op, &resolver) {
                Ok(_) => {
                    tree = attempt;
                    applied.push(op);
                }
                Err(e) => {
                    warn!(operation = %op, error = %e, "dropping conflicting operation");
                    conflicts.push(Conflict {
                        operation: op,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.ids.observe(local.id());
        self.ids.observe(incoming.id());
        let mut builder = VersionBuilder::merge(self.ids.generate()?, tree, &base, local, incoming)
            .time(Utc::now())
            .operations(applied);
        if let Some(author) = &self.author {
            builder = builder.author(author.clone());
        }
        let version = builder.build()?;
        info!(
            local = %local.content_hash().short_hex(),
            incoming = %incoming.content_hash().short_hex(),
            base = %base.content_hash().short_hex(),
            merged = %version.content_hash().short_hex(),
            conflicts = conflicts.len(),
            "merged versions"
        );
        Ok(MergeOutcome::Merged { version, conflicts })
    }

    /// The nearest version both `a` and `b` descend from.
    ///
    /// Both histories are walked one generation at a time, each generation of
    /// both sides in a single batch read. When several common versions turn
    /// up in the same generation the highest id wins.
    pub fn common_ancestor(&self, a: &Version, b: &Version) -> MergeResult<Option<Version>> {
        let mut sides = [Side::new(a), Side::new(b)];
        loop {
            if let Some(found) = shared(&sides) {
                return Ok(Some(found));
            }
            let wave: Vec<HashRef<VersionData>> = {
                let mut unique = HashSet::new();
                sides
                    .iter()
                    .flat_map(|side| side.frontier.iter().copied())
                    .filter(|hash| unique.insert(hash.hash()))
                    .collect()
            };
            if wave.is_empty() {
                return Ok(None);
            }
            let loaded: HashMap<ContentHash, Version> = load_versions(&self.cache, &wave)?
                .into_iter()
                .map(|version| (version.content_hash(), version))
                .collect();
            for side in &mut sides {
                side.advance(&loaded);
            }
        }
    }
}

impl fmt::Debug for VersionMerger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionMerger")
            .field("client_id", &self.ids.client_id())
            .field("author", &self.author)
            .finish()
    }
}

/// The part of one side's history seen so far.
struct Side {
    seen: HashMap<ContentHash, Version>,
    frontier: Vec<HashRef<VersionData>>,
}

impl Side {
    fn new(head: &Version) -> Self {
        Self {
            seen: HashMap::from([(head.content_hash(), head.clone())]),
            frontier: head.data().parents(),
        }
    }

    fn advance(&mut self, loaded: &HashMap<ContentHash, Version>) {
        for hash in std::mem::take(&mut self.frontier) {
            let Some(version) = loaded.get(&hash.hash()) else {
                continue;
            };
            if self.seen.contains_key(&hash.hash()) {
                continue;
            }
            self.seen.insert(hash.hash(), version.clone());
            for parent in version.data().parents() {
                if !self.seen.contains_key(&parent.hash()) {
                    self.frontier.push(parent);
                }
            }
        }
    }
}

fn shared(sides: &[Side; 2]) -> Option<Version> {
    sides[0]
        .seen
        .iter()
        .filter(|(hash, _)| sides[1].seen.contains_key(*hash))
        .map(|(_, version)| version)
        .max_by_key(|version| (version.id(), version.content_hash()))
        .cloned()
}

/// Clamp a child index to the length of the list it targets in `tree`.
fn clamp_index(op: Operation, tree: &Tree) -> MergeResult<Operation> {
    let op = match op {
        Operation::AddNewChild {
            parent,
            role,
            index: Some(index),
            child,
            concept,
        } => {
            let len = match tree.node(parent)? {
                Some(node) => node.children_in(&role).len(),
                None => index,
            };
            Operation::AddNewChild {
                parent,
                role,
                index: Some(index.min(len)),
                child,
                concept,
            }
        }
        Operation::MoveNode {
            node,
            parent,
            role,
            index: Some(index),
        } => {
            let len = match tree.node(parent)? {
                Some(target) => {
                    let list = target.children_in(&role);
                    list.len() - usize::from(list.contains(&node))
                }
                None => index,
            };
            Operation::MoveNode {
                node,
                parent,
                role,
                index: Some(index.min(len)),
            }
        }
        other => other,
    };
    Ok(op)
}
