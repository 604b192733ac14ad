//! Reachability over everything a version references.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use arbor_query::{BulkQuery, Value};
use arbor_store::{HashRef, ObjectCache, StagingObjectStore};
use arbor_tree::{NodeData, Operation, TreeData, TrieNode};
use arbor_types::ContentHash;

use crate::error::VersionResult;
use crate::version::{OperationsList, VersionData};

#[derive(Clone, Copy)]
enum Pending {
    Version(HashRef<VersionData>),
    Operations(HashRef<OperationsList>),
    Tree(HashRef<TreeData>),
    Trie(HashRef<TrieNode>),
    Node(HashRef<NodeData>),
}

impl Pending {
    fn hash(&self) -> ContentHash {
        match self {
            Self::Version(r) => r.hash(),
            Self::Operations(r) => r.hash(),
            Self::Tree(r) => r.hash(),
            Self::Trie(r) => r.hash(),
            Self::Node(r) => r.hash(),
        }
    }
}

/// Every hash reachable from `version`: the version's ancestors, their trees
/// with all trie nodes and node records, and stored operation logs.
///
/// Each wave fetches everything discovered by the previous one in a single
/// batch read. A missing object fails the walk.
pub fn collect_reachable(
    cache: &Arc<ObjectCache>,
    version: HashRef<VersionData>,
) -> VersionResult<HashSet<ContentHash>> {
    let (seen, waves) = walk(cache, version, |_| true)?;
    debug!(version = %version.hash().short_hex(), objects = seen.len(), waves, "collected reachable objects");
    Ok(seen)
}

/// Publish the staged objects `version` needs and return how many were
/// published.
///
/// The walk only descends into staged objects: anything already in the
/// backing store was published together with everything it references.
/// Staged objects the version does not reach stay behind and are dropped
/// with the overlay.
pub fn publish_version(
    cache: &Arc<ObjectCache>,
    staging: &StagingObjectStore,
    version: HashRef<VersionData>,
) -> VersionResult<usize> {
    let (needed, waves) = walk(cache, version, |hash| staging.is_staged(hash))?;
    let needed: Vec<ContentHash> = needed.into_iter().collect();
    let published = staging.publish(&needed)?;
    debug!(
        version = %version.hash().short_hex(),
        published,
        left_behind = staging.staged_len(),
        waves,
        "published version"
    );
    Ok(published)
}

/// Walk from `version`, expanding only objects accepted by `follow`.
/// Returns the accepted hashes and the number of waves.
fn walk(
    cache: &Arc<ObjectCache>,
    version: HashRef<VersionData>,
    follow: impl Fn(&ContentHash) -> bool,
) -> VersionResult<(HashSet<ContentHash>, usize)> {
    let mut seen = HashSet::new();
    let mut frontier = Vec::new();
    if follow(&version.hash()) {
        seen.insert(version.hash());
        frontier.push(Pending::Version(version));
    }
    let mut waves = 0usize;
    while !frontier.is_empty() {
        let query = BulkQuery::new(Arc::clone(cache));
        let discovered = query
            .map(std::mem::take(&mut frontier), |pending| expand(&query, pending))
            .execute()?;
        frontier = discovered
            .into_iter()
            .flatten()
            .filter(|pending| follow(&pending.hash()) && seen.insert(pending.hash()))
            .collect();
        waves += 1;
    }
    Ok((seen, waves))
}

fn expand(query: &BulkQuery, pending: Pending) -> Value<Vec<Pending>> {
    match pending {
        Pending::Version(r) => query.get_required(r).map(|version| {
            let mut links = vec![Pending::Tree(version.tree)];
            links.extend(
                [
                    version.previous_version,
                    version.base_version,
                    version.merged_version1,
                    version.merged_version2,
                ]
                .into_iter()
                .flatten()
                .map(Pending::Version),
            );
            links.extend(version.operations_hash.map(Pending::Operations));
            for op in version.operations.iter().flatten() {
                links.extend(operation_links(op));
            }
            links
        }),
        Pending::Operations(r) => query
            .get_required(r)
            .map(|list| list.operations.iter().flat_map(operation_links).collect()),
        Pending::Tree(r) => query
            .get_required(r)
            .map(|tree| vec![Pending::Trie(tree.nodes)]),
        Pending::Trie(r) => query.get_required(r).map(|node| match &*node {
            TrieNode::Internal { children } => {
                children.iter().map(|slot| Pending::Trie(slot.child)).collect()
            }
            TrieNode::Leaf { value, .. } => vec![Pending::Node(*value)],
        }),
        Pending::Node(r) => query.get_required(r).map(|_| Vec::new()),
    }
}

fn operation_links(op: &Operation) -> Vec<Pending> {
    match op {
        Operation::RevertTo { from, to } => vec![
            Pending::Version(HashRef::new(*from)),
            Pending::Version(HashRef::new(*to)),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{CountingObjectStore, InMemoryObjectStore, ObjectStore};
    use arbor_tree::{NoRevert, Tree};
    use arbor_types::{NodeId, TreeId};

    use crate::version::VersionBuilder;

    type Counting = CountingObjectStore<InMemoryObjectStore>;

    fn add(child: u64) -> Operation {
        Operation::AddNewChild {
            parent: NodeId::ROOT,
            role: "items".into(),
            index: None,
            child: NodeId::new(child),
            concept: None,
        }
    }

    #[test]
    fn reaches_everything_written_for_a_history() {
        let store = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let cache = Arc::new(ObjectCache::new(store.clone()));
        let mut tree = Tree::new(Arc::clone(&cache), TreeId::new("t")).unwrap();

        let mut head = None;
        for round in 0..3u64 {
            let ops: Vec<_> = (0..12).map(|i| add(2 + round * 12 + i)).collect();
            for op in &ops {
                tree.apply(op, &NoRevert).unwrap();
            }
            let version = VersionBuilder::regular(round + 1, tree.clone())
                .base(head.as_ref())
                .operations(ops)
                .build()
                .unwrap();
            head = Some(version);
        }
        let head = head.unwrap();

        let fresh = Arc::new(ObjectCache::new(store.clone()));
        let reachable = collect_reachable(&fresh, head.hash()).unwrap();

        assert!(reachable.contains(&head.content_hash()));
        assert!(reachable.contains(&head.tree_ref().hash()));
        for version in head.ancestors() {
            let version = version.unwrap();
            assert!(reachable.contains(&version.content_hash()));
            let list = version.data().operations_hash.unwrap();
            assert!(reachable.contains(&list.hash()));
        }
        for hash in &reachable {
            assert!(store.exists(hash).unwrap());
        }
    }

    #[test]
    fn publishing_skips_scratch_states() {
        let backing = Arc::new(InMemoryObjectStore::new());
        let base = {
            let cache = Arc::new(ObjectCache::new(backing.clone()));
            let tree = Tree::new(cache, TreeId::new("t")).unwrap();
            VersionBuilder::regular(1, tree).build().unwrap()
        };
        let before = backing.len();

        let staging = Arc::new(StagingObjectStore::new(backing.clone()));
        let cache = Arc::new(ObjectCache::new(staging.clone()));
        let mut tree = Tree::load(Arc::clone(&cache), base.tree_ref()).unwrap();
        let ops: Vec<_> = (2..8).map(add).collect();
        for op in &ops {
            tree.apply(op, &NoRevert).unwrap();
        }
        let version = VersionBuilder::regular(2, tree)
            .base(Some(&base))
            .operations(ops)
            .build()
            .unwrap();
        let staged = staging.staged_len();

        let published = publish_version(&cache, &staging, version.hash()).unwrap();
        assert!(published > 0);
        assert!(published < staged);
        assert_eq!(backing.len(), before + published);

        let fresh = Arc::new(ObjectCache::new(backing.clone()));
        let reachable = collect_reachable(&fresh, version.hash()).unwrap();
        for hash in &reachable {
            assert!(backing.exists(hash).unwrap());
        }
    }

    #[test]
    fn missing_object_fails() {
        let cache = Arc::new(ObjectCache::new(Arc::new(Counting::new(InMemoryObjectStore::new()))));
        let hash = HashRef::<VersionData>::new(ContentHash::from_bytes(b"absent"));
        assert!(collect_reachable(&cache, hash).is_err());
    }
}
