use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use arbor_query::{BulkQuery, DEFAULT_BATCH_SIZE};
use arbor_store::{HashRef, ObjectCache, ObjectKind, StoredValue};
use arbor_types::{NodeId, TreeId};

use crate::error::{TreeError, TreeResult};
use crate::hamt::{self, TrieNode};
use crate::node::NodeData;
use crate::operation::{AppliedOperation, Operation, RevertResolver};
use crate::snapshot::TreeSnapshot;
use crate::table::NodeTable;

/// The stored record of a tree: its stable id and the root of its node
/// index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeData {
    pub tree_id: TreeId,
    pub nodes: HashRef<TrieNode>,
}

impl StoredValue for TreeData {
    const KIND: ObjectKind = ObjectKind::Tree;
}

/// A persistent tree bound to a store session.
///
/// Edits path-copy the node index and write every new object through the
/// session cache, so the previous generation stays valid and shares all
/// untouched objects. Cloning is cheap.
#[derive(Clone)]
pub struct Tree {
    cache: Arc<ObjectCache>,
    tree_id: TreeId,
    root: HashRef<TrieNode>,
    batch_size: usize,
}

impl Tree {
    /// A tree holding only the root node.
    pub fn new(cache: Arc<ObjectCache>, tree_id: TreeId) -> TreeResult<Self> {
        let empty = hamt::write_empty(&cache)?;
        let mut tree = Self {
            cache,
            tree_id,
            root: empty,
            batch_size: DEFAULT_BATCH_SIZE,
        };
        tree.put(NodeData::root())?;
        Ok(tree)
    }

    /// A tree with a fresh id holding only the root node.
    pub fn empty(cache: Arc<ObjectCache>) -> TreeResult<Self> {
        Self::new(cache, TreeId::generate())
    }

    pub fn from_data(cache: Arc<ObjectCache>, data: &TreeData) -> Self {
        Self {
            cache,
            tree_id: data.tree_id.clone(),
            root: data.nodes,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Open a stored tree.
    pub fn load(cache: Arc<ObjectCache>, reference: HashRef<TreeData>) -> TreeResult<Self> {
        let data = reference.resolve(&cache)?;
        Ok(Self::from_data(cache, &data))
    }

    /// Write `snapshot` as a tree with the given id.
    pub fn from_snapshot(
        cache: Arc<ObjectCache>,
        tree_id: TreeId,
        snapshot: &TreeSnapshot,
    ) -> TreeResult<Self> {
        let empty = hamt::write_empty(&cache)?;
        let mut tree = Self {
            cache,
            tree_id,
            root: empty,
            batch_size: DEFAULT_BATCH_SIZE,
        };
        for node in snapshot.iter() {
            tree.put(node.clone())?;
        }
        Ok(tree)
    }

    /// Use `batch_size` for the bulk reads this tree issues.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn tree_id(&self) -> &TreeId {
        &self.tree_id
    }

    /// Root of the node index. Equal node sets give equal roots.
    pub fn index_root(&self) -> HashRef<TrieNode> {
        self.root
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    pub fn data(&self) -> TreeData {
        TreeData {
            tree_id: self.tree_id.clone(),
            nodes: self.root,
        }
    }

    /// Store the tree record and return its reference.
    pub fn write(&self) -> TreeResult<HashRef<TreeData>> {
        Ok(HashRef::write(self.data(), &self.cache)?)
    }

    /// A bulk query over this tree's store session.
    pub fn query(&self) -> BulkQuery {
        BulkQuery::with_batch_size(Arc::clone(&self.cache), self.batch_size)
    }

    /// Fetch several nodes at once: one wave per index level plus one for
    /// the records.
    pub fn nodes(&self, ids: &[NodeId]) -> TreeResult<Vec<Option<Arc<NodeData>>>> {
        let query = self.query();
        let root = self.root;
        let q = query.clone();
        let value = query.map(ids.to_vec(), move |id| {
            let inner = q.clone();
            hamt::lookup(&q, root, id, 0).map_bulk(move |found| match found {
                Some(record) => inner.get_required(record).map(Some),
                None => inner.constant(None),
            })
        });
        Ok(value.execute()?)
    }

    /// Read every node in O(index depth) waves.
    pub fn load_snapshot(&self) -> TreeResult<TreeSnapshot> {
        let query = self.query();
        let q = query.clone();
        let value = hamt::leaves(&query, self.root).map_bulk(move |entries| {
            let inner = q.clone();
            q.map(entries, move |(key, record)| {
                inner
                    .get_required(record)
                    .try_map(move |node| check_key(key, node))
            })
        });
        let nodes = value.execute()?;
        debug!(tree = %self.tree_id, nodes = nodes.len(), waves = query.waves(), "loaded tree snapshot");
        Ok(TreeSnapshot::from_shared(
            nodes.into_iter().map(|node| (node.id, node)).collect::<BTreeMap<_, _>>(),
        ))
    }

    /// Apply `operation` to this tree.
    pub fn apply(
        &mut self,
        operation: &Operation,
        resolver: &dyn RevertResolver,
    ) -> TreeResult<AppliedOperation> {
        operation.apply(self, resolver)
    }
}

fn check_key(key: NodeId, node: Arc<NodeData>) -> TreeResult<Arc<NodeData>> {
    if node.id == key {
        Ok(node)
    } else {
        Err(TreeError::Corrupt(format!(
            "index entry {key} points at node {}",
            node.id
        )))
    }
}

impl NodeTable for Tree {
    fn node(&self, id: NodeId) -> TreeResult<Option<Arc<NodeData>>> {
        match hamt::get(&self.cache, self.root, id)? {
            Some(record) => Ok(Some(record.resolve(&self.cache)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, node: NodeData) -> TreeResult<()> {
        let id = node.id;
        let record = HashRef::write(node, &self.cache)?;
        self.root = hamt::insert(&self.cache, self.root, id, record)?;
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> TreeResult<()> {
        match hamt::remove(&self.cache, self.root, id)? {
            Some(root) => {
                self.root = root;
                Ok(())
            }
            None => Err(TreeError::NodeNotFound(id)),
        }
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.tree_id == other.tree_id && self.root == other.root
    }
}

impl Eq for Tree {}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("tree_id", &self.tree_id)
            .field("root", &self.root)
            .finish()
    }
}
