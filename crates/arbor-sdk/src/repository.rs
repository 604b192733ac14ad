use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::info;

use arbor_branch::{Branch, BranchResult, OtBranch, ReadTransaction, WriteTransaction};
use arbor_merge::{MergeOutcome, VersionMerger};
use arbor_refs::ReferenceRegistry;
use arbor_store::{HashRef, InMemoryObjectStore, ObjectCache, ObjectStore, StagingObjectStore};
use arbor_tree::{Operation, Tree};
use arbor_types::{ContentHash, IdGenerator, TreeId};
use arbor_version::{
    collect_reachable, publish_version, LinearHistory, Version, VersionBuilder, VersionData,
    VersionRevertResolver,
};

use crate::config::ArborConfig;
use crate::error::{SdkError, SdkResult};
use crate::history::HistoryEntry;

#[derive(Clone)]
struct BranchHead {
    tree_id: TreeId,
    version: Option<HashRef<VersionData>>,
}

/// A staged store session: writes stay out of the backing store until a
/// version is published.
struct Staged {
    store: Arc<StagingObjectStore>,
    cache: Arc<ObjectCache>,
}

/// High-level arbor repository API.
///
/// Holds one store session, the reference registry, the id generator, and
/// the named branch heads. Commits are optimistic: a commit whose branch
/// moved while it was being prepared is rejected with
/// [`SdkError::HeadMoved`].
///
/// Every transaction writes into its own staging overlay. Only the objects
/// the new version reaches are published to the store; a failed or empty
/// transaction leaves the store untouched.
pub struct Repository {
    cache: Arc<ObjectCache>,
    registry: Arc<ReferenceRegistry>,
    ids: Arc<IdGenerator>,
    config: ArborConfig,
    heads: RwLock<BTreeMap<String, BranchHead>>,
}

impl Repository {
    /// Open a repository over `store`.
    pub fn open(store: Arc<dyn ObjectStore>, config: ArborConfig) -> SdkResult<Self> {
        config.validate()?;
        let ids = match config.client_id {
            Some(client_id) => IdGenerator::new(client_id),
            None => IdGenerator::random(),
        };
        Ok(Self {
            cache: Arc::new(ObjectCache::bounded(store, config.cache_capacity)),
            registry: Arc::new(ReferenceRegistry::new()),
            ids: Arc::new(ids),
            config,
            heads: RwLock::new(BTreeMap::new()),
        })
    }

    /// A repository backed by a fresh in-memory store.
    pub fn in_memory() -> SdkResult<Self> {
        Self::open(Arc::new(InMemoryObjectStore::new()), ArborConfig::default())
    }

    pub fn config(&self) -> &ArborConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ReferenceRegistry> {
        &self.registry
    }

    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    // ---- Branches ----

    /// Create an empty branch: a tree holding only the root, no versions.
    pub fn init_branch(&self, name: &str) -> SdkResult<()> {
        self.insert_head(
            name,
            BranchHead {
                tree_id: TreeId::generate(),
                version: None,
            },
        )
    }

    /// Create a branch pointing at `version`.
    pub fn branch_from(&self, name: &str, version: &Version) -> SdkResult<()> {
        let tree_id = version.tree()?.tree_id().clone();
        self.ids.observe(version.id());
        self.insert_head(
            name,
            BranchHead {
                tree_id,
                version: Some(version.hash()),
            },
        )
    }

    fn insert_head(&self, name: &str, head: BranchHead) -> SdkResult<()> {
        let mut heads = self.heads.write().expect("lock poisoned");
        if heads.contains_key(name) {
            return Err(SdkError::BranchExists(name.to_string()));
        }
        heads.insert(name.to_string(), head);
        Ok(())
    }

    pub fn branches(&self) -> Vec<String> {
        self.heads.read().expect("lock poisoned").keys().cloned().collect()
    }

    /// The latest version of `branch`, or `None` before its first commit.
    pub fn head(&self, branch: &str) -> SdkResult<Option<Version>> {
        let head = self.branch_head(branch)?;
        head.version
            .map(|hash| Version::load(Arc::clone(&self.cache), hash))
            .transpose()
            .map_err(SdkError::from)
    }

    fn branch_head(&self, branch: &str) -> SdkResult<BranchHead> {
        self.heads
            .read()
            .expect("lock poisoned")
            .get(branch)
            .cloned()
            .ok_or_else(|| SdkError::BranchNotFound(branch.to_string()))
    }

    /// Move `branch` from `expected` to `next`, unless someone else moved it.
    /// `next` is published from `staged` before the head moves.
    fn advance(
        &self,
        branch: &str,
        expected: Option<HashRef<VersionData>>,
        next: &Version,
        staged: Option<&Staged>,
    ) -> SdkResult<()> {
        let mut heads = self.heads.write().expect("lock poisoned");
        let head = heads
            .get_mut(branch)
            .ok_or_else(|| SdkError::BranchNotFound(branch.to_string()))?;
        if head.version != expected {
            return Err(SdkError::HeadMoved(branch.to_string()));
        }
        if let Some(staged) = staged {
            publish_version(&staged.cache, &staged.store, next.hash())?;
        }
        head.version = Some(next.hash());
        Ok(())
    }

    fn stage(&self) -> Staged {
        let store = Arc::new(StagingObjectStore::new(Arc::clone(self.cache.store())));
        let cache = Arc::new(ObjectCache::child(&self.cache, store.clone()));
        Staged { store, cache }
    }

    /// `version` as seen through the repository's own session.
    fn attach(&self, version: &Version) -> Version {
        Version::from_parts(Arc::clone(&self.cache), version.hash(), Arc::clone(version.data()))
    }

    fn tree_of(
        &self,
        cache: &Arc<ObjectCache>,
        head: &BranchHead,
        version: Option<&Version>,
    ) -> SdkResult<Tree> {
        let tree = match version {
            Some(version) => Tree::load(Arc::clone(cache), version.tree_ref())?,
            None => Tree::new(Arc::clone(cache), head.tree_id.clone())?,
        };
        Ok(tree.with_batch_size(self.config.query_batch_size))
    }

    // ---- Reading and writing ----

    /// Run a read transaction on the head of `branch`.
    pub fn read<R>(
        &self,
        branch: &str,
        f: impl FnOnce(&ReadTransaction) -> BranchResult<R>,
    ) -> SdkResult<R> {
        let head = self.branch_head(branch)?;
        let version = self.head(branch)?;
        let staged = self.stage();
        let tree = self.tree_of(&staged.cache, &head, version.as_ref())?;
        let session = Branch::new(tree, Arc::clone(&self.ids));
        Ok(session.compute_read(f)?)
    }

    /// Edit the head of `branch` and record the edits as a new version.
    ///
    /// Returns the new head and the closure's value. A transaction that
    /// changes nothing creates no version.
    pub fn commit<R>(
        &self,
        branch: &str,
        author: Option<&str>,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<R>,
    ) -> SdkResult<(Option<Version>, R)> {
        let head = self.branch_head(branch)?;
        let base = head
            .version
            .map(|hash| Version::load(Arc::clone(&self.cache), hash))
            .transpose()?;
        if let Some(base) = &base {
            self.ids.observe(base.id());
        }
        let staged = self.stage();
        let session = OtBranch::new(Branch::with_resolver(
            self.tree_of(&staged.cache, &head, base.as_ref())?,
            Arc::clone(&self.ids),
            Arc::new(VersionRevertResolver::new(Arc::clone(&staged.cache))),
        ));
        let value = session.compute_write(f)?;
        let (operations, tree) = session.operations_and_tree();
        if operations.is_empty() {
            return Ok((base, value));
        }

        let mut builder = VersionBuilder::regular(self.ids.generate()?, tree)
            .base(base.as_ref())
            .time(Utc::now())
            .operations(operations)
            .inline_limit(self.config.inline_operations_limit)
            .compress(self.config.compress_operations);
        if let Some(author) = author.or(self.config.default_author.as_deref()) {
            builder = builder.author(author);
        }
        let version = builder.build()?;
        self.advance(branch, head.version, &version, Some(&staged))?;
        let version = self.attach(&version);
        info!(
            branch,
            version = %version.content_hash().short_hex(),
            operations = version.number_of_operations(),
            "committed"
        );
        Ok((Some(version), value))
    }

    /// Commit a revert of `branch` from the tree of `from` to the tree of
    /// `to`.
    pub fn revert(
        &self,
        branch: &str,
        from: &Version,
        to: &Version,
        author: Option<&str>,
    ) -> SdkResult<Option<Version>> {
        let operation = Operation::RevertTo {
            from: from.content_hash(),
            to: to.content_hash(),
        };
        let (version, ()) = self.commit(branch, author, |tx| {
            tx.apply_operation(operation)?;
            Ok(())
        })?;
        Ok(version)
    }

    /// Merge `other` into `branch`.
    pub fn merge(&self, branch: &str, other: &Version) -> SdkResult<MergeOutcome> {
        let head = self.branch_head(branch)?;
        let Some(local) = self.head(branch)? else {
            self.advance(branch, None, other, None)?;
            return Ok(MergeOutcome::FastForward(self.attach(other)));
        };
        let staged = self.stage();
        let mut merger = VersionMerger::new(Arc::clone(&staged.cache), Arc::clone(&self.ids));
        if let Some(author) = &self.config.default_author {
            merger = merger.with_author(author.clone());
        }
        let outcome = match merger.merge(&local, other)? {
            MergeOutcome::FastForward(version) => MergeOutcome::FastForward(self.attach(&version)),
            MergeOutcome::Merged { version, conflicts } => {
                self.advance(branch, head.version, &version, Some(&staged))?;
                return Ok(MergeOutcome::Merged {
                    version: self.attach(&version),
                    conflicts,
                });
            }
        };
        if outcome.head() != &local {
            self.advance(branch, head.version, outcome.head(), None)?;
        }
        Ok(outcome)
    }

    // ---- History ----

    /// History of `branch`, newest first. A merge row is followed by the
    /// versions it merged, newest first.
    pub fn history(&self, branch: &str, skip: usize, limit: usize) -> SdkResult<Vec<HistoryEntry>> {
        let wanted = skip.saturating_add(limit);
        let mut rows = Vec::new();
        let mut next = self.head(branch)?;
        while let Some(version) = next {
            if rows.len() >= wanted {
                break;
            }
            rows.push(HistoryEntry::new(&version, None));
            if version.is_merge() {
                let heads: Vec<Version> = [version.merged_version1()?, version.merged_version2()?]
                    .into_iter()
                    .flatten()
                    .collect();
                let merged = LinearHistory::new(version.base_version_ref()).load(&heads)?;
                rows.extend(
                    merged
                        .iter()
                        .rev()
                        .map(|v| HistoryEntry::new(v, Some(version.content_hash()))),
                );
            }
            next = version.base_version()?;
        }
        Ok(rows.into_iter().skip(skip).take(limit).collect())
    }

    /// Every stored object the head of `branch` keeps alive.
    pub fn reachable(&self, branch: &str) -> SdkResult<HashSet<ContentHash>> {
        match self.branch_head(branch)?.version {
            Some(version) => Ok(collect_reachable(&self.cache, version)?),
            None => Ok(HashSet::new()),
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("branches", &self.branches())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_branch::ReadAccess;
    use arbor_tree::NodeTable;
    use arbor_types::{ErrorClass, NodeId, NodeRef};

    fn repo() -> Repository {
        let repo = Repository::in_memory().unwrap();
        repo.init_branch("main").unwrap();
        repo
    }

    fn set_name(repo: &Repository, branch: &str, value: &str) -> Version {
        repo.commit(branch, None, |tx| {
            tx.set_property(NodeId::ROOT, "name", Some(value.into()))
        })
        .unwrap()
        .0
        .unwrap()
    }

    // ---- Scenario ----

    #[test]
    fn commit_walk_and_revert() {
        let repo = repo();

        let v1 = set_name(&repo, "main", "Foo");
        assert_eq!(v1.number_of_operations(), 1);
        assert!(v1.operations_inlined());
        assert_eq!(v1.base_version().unwrap(), None);

        let (v2, c1) = repo
            .commit("main", Some("alice"), |tx| {
                tx.add_new_child(NodeId::ROOT, "items", None, Some("c1".into()))
            })
            .unwrap();
        let v2 = v2.unwrap();
        assert_eq!(v2.base_version().unwrap(), Some(v1.clone()));
        assert_eq!(v2.number_of_operations(), 1);
        assert!(v2.operations_inlined());
        assert_eq!(v2.author(), Some("alice"));

        let walked: Vec<Version> = v2.ancestors().map(Result::unwrap).collect();
        assert_eq!(walked, vec![v2.clone(), v1.clone()]);

        let v3 = repo.revert("main", &v2, &v1, None).unwrap().unwrap();
        assert_eq!(v3.tree().unwrap(), v1.tree().unwrap());
        assert!(!v3.tree().unwrap().contains(c1).unwrap());
        assert_eq!(
            v3.tree().unwrap().load_snapshot().unwrap(),
            v1.tree().unwrap().load_snapshot().unwrap()
        );
        assert_eq!(repo.head("main").unwrap(), Some(v3));
    }

    // ---- Branches ----

    #[test]
    fn branch_lifecycle() {
        let repo = repo();
        assert_eq!(repo.head("main").unwrap(), None);
        assert!(matches!(
            repo.init_branch("main"),
            Err(SdkError::BranchExists(_))
        ));
        let err = repo.head("missing").unwrap_err();
        assert!(matches!(err, SdkError::BranchNotFound(_)));
        assert_eq!(err.class(), ErrorClass::NotFound);

        let v1 = set_name(&repo, "main", "Foo");
        repo.branch_from("feature", &v1).unwrap();
        assert_eq!(repo.branches(), vec!["feature".to_string(), "main".to_string()]);
        assert_eq!(repo.head("feature").unwrap(), Some(v1));
    }

    #[test]
    fn empty_commit_creates_no_version() {
        let repo = repo();
        let v1 = set_name(&repo, "main", "Foo");
        let (head, count) = repo
            .commit("main", None, |tx| tx.children(NodeId::ROOT, "items").map(|c| c.len()))
            .unwrap();
        assert_eq!(head, Some(v1));
        assert_eq!(count, 0);
    }

    #[test]
    fn failed_commit_leaves_head() {
        let repo = repo();
        let v1 = set_name(&repo, "main", "Foo");
        let result = repo.commit("main", None, |tx| {
            tx.set_property(NodeId::ROOT, "name", Some("Bar".into()))?;
            tx.delete_node(NodeId::new(404))
        });
        assert!(result.is_err());
        assert_eq!(repo.head("main").unwrap(), Some(v1));
    }

    #[test]
    fn failed_commit_publishes_nothing() {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo = Repository::open(store.clone(), ArborConfig::default()).unwrap();
        repo.init_branch("main").unwrap();

        let result = repo.commit("main", None, |tx| {
            for i in 0..50 {
                tx.set_property(NodeId::ROOT, "name", Some(i.to_string()))?;
            }
            tx.delete_node(NodeId::new(404))
        });
        assert!(result.is_err());
        assert!(store.is_empty());
        assert_eq!(repo.cache().cached_count(), 0);
        assert_eq!(repo.head("main").unwrap(), None);

        repo.read("main", |tx| tx.property(NodeId::ROOT, "name")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn commit_publishes_only_reachable_objects() {
        let store = Arc::new(InMemoryObjectStore::new());
        let repo = Repository::open(store.clone(), ArborConfig::default()).unwrap();
        repo.init_branch("main").unwrap();

        for round in 0..3 {
            repo.commit("main", None, |tx| {
                for i in 0..20 {
                    tx.set_property(NodeId::ROOT, "name", Some(format!("{round}-{i}")))?;
                }
                tx.add_new_child(NodeId::ROOT, "items", None, None)
            })
            .unwrap();
        }
        assert_eq!(store.len(), repo.reachable("main").unwrap().len());
    }

    #[test]
    fn bounded_session_cache() {
        let config = ArborConfig {
            cache_capacity: 4,
            ..ArborConfig::default()
        };
        let repo = Repository::open(Arc::new(InMemoryObjectStore::new()), config).unwrap();
        repo.init_branch("main").unwrap();
        for name in ["a", "b", "c"] {
            set_name(&repo, "main", name);
        }
        repo.history("main", 0, 10).unwrap();
        repo.read("main", |tx| tx.property(NodeId::ROOT, "name")).unwrap();
        assert!(repo.cache().cached_count() <= 4);
    }

    #[test]
    fn concurrent_commit_is_rejected() {
        let repo = repo();
        set_name(&repo, "main", "Foo");
        let result = repo.commit("main", None, |tx| {
            set_name(&repo, "main", "Sneaky");
            tx.set_property(NodeId::ROOT, "name", Some("Mine".into()))
        });
        let err = result.unwrap_err();
        assert!(matches!(err, SdkError::HeadMoved(_)));
        assert_eq!(err.class(), ErrorClass::Usage);
        assert_eq!(
            repo.read("main", |tx| tx.property(NodeId::ROOT, "name")).unwrap().as_deref(),
            Some("Sneaky")
        );
    }

    #[test]
    fn config_controls_inlining_and_author() {
        let config = ArborConfig {
            inline_operations_limit: 1,
            default_author: Some("robot".into()),
            ..ArborConfig::default()
        };
        let repo = Repository::open(Arc::new(InMemoryObjectStore::new()), config).unwrap();
        repo.init_branch("main").unwrap();
        let (version, ()) = repo
            .commit("main", None, |tx| {
                tx.set_property(NodeId::ROOT, "a", Some("1".into()))?;
                tx.set_property(NodeId::ROOT, "b", Some("2".into()))
            })
            .unwrap();
        let version = version.unwrap();
        assert!(!version.operations_inlined());
        assert_eq!(version.number_of_operations(), 2);
        assert_eq!(version.author(), Some("robot"));
    }

    // ---- Ids ----

    #[test]
    fn reopened_repository_continues_past_existing_ids() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let config = ArborConfig {
            client_id: Some(5),
            ..ArborConfig::default()
        };
        let first = Repository::open(Arc::clone(&store), config.clone()).unwrap();
        first.init_branch("main").unwrap();
        let (v1, c1) = first
            .commit("main", None, |tx| tx.add_new_child(NodeId::ROOT, "items", None, None))
            .unwrap();
        let v1 = v1.unwrap();

        let second = Repository::open(store, config).unwrap();
        second.branch_from("main", &v1).unwrap();
        let (v2, c2) = second
            .commit("main", None, |tx| tx.add_new_child(NodeId::ROOT, "items", None, None))
            .unwrap();
        let v2 = v2.unwrap();

        assert_ne!(c1, c2);
        assert!(v2.id() > v1.id());
        assert_eq!(
            second.read("main", |tx| tx.children(NodeId::ROOT, "items")).unwrap(),
            vec![c1, c2]
        );
    }

    #[test]
    fn unconfigured_repositories_use_distinct_clients() {
        let a = Repository::in_memory().unwrap();
        let b = Repository::in_memory().unwrap();
        assert_ne!(a.id_generator().client_id(), b.id_generator().client_id());
    }

    // ---- Merge and history ----

    #[test]
    fn merge_and_history() {
        let repo = repo();
        let base = set_name(&repo, "main", "Foo");
        repo.branch_from("feature", &base).unwrap();

        let f1 = repo
            .commit("feature", None, |tx| tx.set_property(NodeId::ROOT, "f", Some("1".into())))
            .unwrap()
            .0
            .unwrap();
        let m1 = repo
            .commit("main", None, |tx| tx.set_property(NodeId::ROOT, "m", Some("1".into())))
            .unwrap()
            .0
            .unwrap();

        let outcome = repo.merge("main", &f1).unwrap();
        assert!(!outcome.is_fast_forward());
        assert!(outcome.conflicts().is_empty());
        let merged = outcome.head().clone();
        assert_eq!(repo.head("main").unwrap(), Some(merged.clone()));
        let props = repo
            .read("main", |tx| Ok((tx.property(NodeId::ROOT, "f")?, tx.property(NodeId::ROOT, "m")?)))
            .unwrap();
        assert_eq!(props, (Some("1".to_string()), Some("1".to_string())));

        let rows = repo.history("main", 0, 10).unwrap();
        let hashes: Vec<ContentHash> = rows.iter().map(|r| r.hash).collect();
        assert_eq!(
            hashes,
            vec![
                merged.content_hash(),
                m1.content_hash(),
                f1.content_hash(),
                base.content_hash()
            ]
        );
        assert!(rows[0].merge);
        assert_eq!(rows[1].merged_by, Some(merged.content_hash()));
        assert_eq!(rows[3].merged_by, None);

        let page = repo.history("main", 1, 2).unwrap();
        assert_eq!(page, rows[1..3].to_vec());

        let json = serde_json::to_string(&rows[0]).unwrap();
        assert!(json.contains(&merged.content_hash().to_hex()));
    }

    #[test]
    fn merging_an_ancestor_is_a_fast_forward() {
        let repo = repo();
        let v1 = set_name(&repo, "main", "Foo");
        let v2 = set_name(&repo, "main", "Bar");
        let outcome = repo.merge("main", &v1).unwrap();
        assert!(outcome.is_fast_forward());
        assert_eq!(repo.head("main").unwrap(), Some(v2));
    }

    #[test]
    fn merge_into_empty_branch_adopts_version() {
        let repo = repo();
        let v1 = set_name(&repo, "main", "Foo");
        repo.init_branch("fresh").unwrap();
        let outcome = repo.merge("fresh", &v1).unwrap();
        assert!(outcome.is_fast_forward());
        assert_eq!(repo.head("fresh").unwrap(), Some(v1));
    }

    // ---- Registry and reachability ----

    #[test]
    fn references_serialize_through_the_registry() {
        let repo = repo();
        let target = NodeRef::global(TreeId::new("t"), NodeId::new(0x2a));
        let text = repo.registry().serialize(&target).unwrap();
        let back = repo.registry().deserialize(&text).unwrap();
        assert!(back.eq_ref(&target));
        assert!(repo.registry().deserialize("nope:1").is_err());
    }

    #[test]
    fn reachable_covers_head_and_history() {
        let repo = repo();
        assert!(repo.reachable("main").unwrap().is_empty());
        let v1 = set_name(&repo, "main", "Foo");
        let v2 = set_name(&repo, "main", "Bar");
        let reachable = repo.reachable("main").unwrap();
        assert!(reachable.contains(&v1.content_hash()));
        assert!(reachable.contains(&v2.content_hash()));
        assert!(reachable.contains(&v2.tree_ref().hash()));
    }
}
