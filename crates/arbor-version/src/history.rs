//! History traversal across merges.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use arbor_query::BulkQuery;
use arbor_store::{HashRef, ObjectCache};
use arbor_types::ContentHash;

use crate::error::VersionResult;
use crate::version::{Version, VersionData};

/// Load several versions with one batch read.
pub fn load_versions(
    cache: &Arc<ObjectCache>,
    hashes: &[HashRef<VersionData>],
) -> VersionResult<Vec<Version>> {
    let query = BulkQuery::new(Arc::clone(cache));
    let loaded = query
        .map(hashes.iter().copied(), |hash| {
            let cache = Arc::clone(cache);
            query
                .get_required(hash)
                .map(move |data| Version::from_parts(cache, hash, data))
        })
        .execute()?;
    Ok(loaded)
}

/// Every version reachable from `heads` through parent links, stopping at
/// `stop`. One batch read per generation.
pub fn collect_versions(
    heads: &[Version],
    stop: Option<HashRef<VersionData>>,
) -> VersionResult<HashMap<ContentHash, Version>> {
    let mut found: HashMap<ContentHash, Version> = HashMap::new();
    let Some(cache) = heads.first().map(|head| Arc::clone(head.cache())) else {
        return Ok(found);
    };
    let mut frontier: Vec<HashRef<VersionData>> = Vec::new();
    let mut queued: HashSet<ContentHash> = HashSet::new();

    for head in heads {
        if Some(head.hash()) == stop || !queued.insert(head.content_hash()) {
            continue;
        }
        enqueue_parents(head, stop, &mut queued, &mut frontier);
        found.insert(head.content_hash(), head.clone());
    }
    let mut generations = 0usize;
    while !frontier.is_empty() {
        let wave = std::mem::take(&mut frontier);
        for version in load_versions(&cache, &wave)? {
            enqueue_parents(&version, stop, &mut queued, &mut frontier);
            found.insert(version.content_hash(), version);
        }
        generations += 1;
    }
    debug!(versions = found.len(), generations, "collected versions");
    Ok(found)
}

fn enqueue_parents(
    version: &Version,
    stop: Option<HashRef<VersionData>>,
    queued: &mut HashSet<ContentHash>,
    frontier: &mut Vec<HashRef<VersionData>>,
) {
    for parent in version.data().parents() {
        if Some(parent) != stop && queued.insert(parent.hash()) {
            frontier.push(parent);
        }
    }
}

/// The linear history of the versions a merge brings together.
///
/// [`load`](Self::load) returns every non-merge version reachable from the
/// given heads down to the common base (excluded), nested merges expanded,
/// parents before children. Versions that do not depend on each other are
/// ordered by ascending id, which interleaves the merged branches.
#[derive(Debug, Clone, Copy)]
pub struct LinearHistory {
    base: Option<HashRef<VersionData>>,
}

impl LinearHistory {
    pub fn new(base: Option<HashRef<VersionData>>) -> Self {
        Self { base }
    }

    pub fn load(&self, heads: &[Version]) -> VersionResult<Vec<Version>> {
        let found = collect_versions(heads, self.base)?;

        let mut pending: HashMap<ContentHash, usize> = HashMap::new();
        let mut children: HashMap<ContentHash, Vec<ContentHash>> = HashMap::new();
        for (hash, version) in &found {
            let parents: Vec<ContentHash> = version
                .data()
                .parents()
                .into_iter()
                .map(|parent| parent.hash())
                .filter(|parent| found.contains_key(parent))
                .collect();
            pending.insert(*hash, parents.len());
            for parent in parents {
                children.entry(parent).or_default().push(*hash);
            }
        }

        let mut ready: BTreeSet<(u64, ContentHash)> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(hash, _)| (found[hash].id(), *hash))
            .collect();
        let mut history = Vec::with_capacity(found.len());
        while let Some((_, hash)) = ready.pop_first() {
            let version = &found[&hash];
            if !version.is_merge() {
                history.push(version.clone());
            }
            for child in children.get(&hash).into_iter().flatten() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert((found[child].id(), *child));
                    }
                }
            }
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{CountingObjectStore, InMemoryObjectStore};
    use arbor_tree::{Operation, Tree};
    use arbor_types::{NodeId, TreeId};

    use crate::version::VersionBuilder;

    type Counting = CountingObjectStore<InMemoryObjectStore>;

    struct Fixture {
        store: Arc<Counting>,
        tree: Tree,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
            let cache = Arc::new(ObjectCache::new(store.clone()));
            let tree = Tree::new(cache, TreeId::new("t")).unwrap();
            Self { store, tree }
        }

        fn commit(&self, id: u64, base: Option<&Version>) -> Version {
            VersionBuilder::regular(id, self.tree.clone())
                .base(base)
                .operations(vec![Operation::SetProperty {
                    node: NodeId::ROOT,
                    role: "step".into(),
                    value: Some(id.to_string()),
                }])
                .build()
                .unwrap()
        }

        fn merge(&self, id: u64, base: &Version, left: &Version, right: &Version) -> Version {
            VersionBuilder::merge(id, self.tree.clone(), base, left, right)
                .build()
                .unwrap()
        }
    }

    fn ids(versions: &[Version]) -> Vec<u64> {
        versions.iter().map(Version::id).collect()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[test]
    fn load_versions_uses_one_batch() {
        let f = Fixture::new();
        let a = f.commit(1, None);
        let b = f.commit(2, Some(&a));
        let c = f.commit(3, Some(&b));

        let cache = Arc::new(ObjectCache::new(f.store.clone()));
        f.store.reset();
        let loaded = load_versions(&cache, &[c.hash(), a.hash(), b.hash()]).unwrap();
        assert_eq!(ids(&loaded), vec![3, 1, 2]);
        assert_eq!(f.store.batch_reads(), 1);
    }

    #[test]
    fn collect_stops_at_base() {
        let f = Fixture::new();
        let a = f.commit(1, None);
        let b = f.commit(2, Some(&a));
        let c = f.commit(3, Some(&b));
        let found = collect_versions(&[c.clone()], Some(a.hash())).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains_key(&b.content_hash()));
        assert!(!found.contains_key(&a.content_hash()));
    }

    // -----------------------------------------------------------------------
    // Linear history
    // -----------------------------------------------------------------------

    #[test]
    fn interleaves_branches_by_id() {
        let f = Fixture::new();
        let base = f.commit(1, None);
        let a1 = f.commit(2, Some(&base));
        let b1 = f.commit(3, Some(&base));
        let a2 = f.commit(4, Some(&a1));
        let b2 = f.commit(5, Some(&b1));

        let history = LinearHistory::new(Some(base.hash()))
            .load(&[a2, b2])
            .unwrap();
        assert_eq!(ids(&history), vec![2, 3, 4, 5]);
    }

    #[test]
    fn parents_come_before_children() {
        let f = Fixture::new();
        let base = f.commit(1, None);
        let late_parent = f.commit(9, Some(&base));
        let early_child = f.commit(2, Some(&late_parent));
        let other = f.commit(5, Some(&base));

        let history = LinearHistory::new(Some(base.hash()))
            .load(&[early_child, other])
            .unwrap();
        assert_eq!(ids(&history), vec![5, 9, 2]);
    }

    #[test]
    fn nested_merges_are_expanded() {
        let f = Fixture::new();
        let base = f.commit(1, None);
        let a = f.commit(2, Some(&base));
        let b = f.commit(3, Some(&base));
        let inner = f.merge(4, &base, &a, &b);
        let c = f.commit(5, Some(&inner));
        let d = f.commit(6, Some(&base));

        let history = LinearHistory::new(Some(base.hash()))
            .load(&[c, d])
            .unwrap();
        assert_eq!(ids(&history), vec![2, 3, 5, 6]);
    }

    #[test]
    fn no_base_walks_to_the_root() {
        let f = Fixture::new();
        let a = f.commit(1, None);
        let b = f.commit(2, Some(&a));
        let history = LinearHistory::new(None).load(&[b]).unwrap();
        assert_eq!(ids(&history), vec![1, 2]);
    }

    #[test]
    fn empty_heads_give_empty_history() {
        assert!(LinearHistory::new(None).load(&[]).unwrap().is_empty());
    }
}
