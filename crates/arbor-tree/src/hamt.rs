//! Persistent hash-array-mapped trie indexing node records by id.
//!
//! Each level consumes five bits of the node id, lowest bits first. A key
//! lives in a leaf at the shallowest level where no other key shares its
//! prefix, and removal collapses internal nodes left holding a single leaf,
//! so the shape (and therefore every hash) depends only on the key set. The
//! root is always an internal node.

use serde::{Deserialize, Serialize};

use arbor_query::{BulkQuery, Value};
use arbor_store::{HashRef, ObjectCache, ObjectKind, StoredValue};
use arbor_types::NodeId;

use crate::error::{TreeError, TreeResult};
use crate::node::NodeData;

const BITS_PER_LEVEL: u32 = 5;
const LEVEL_MASK: u64 = 0x1f;
/// Deepest level an internal node can sit at: 13 levels cover 64 bits.
const MAX_LEVEL: u32 = 12;

/// A trie node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum TrieNode {
    Internal { children: Vec<TrieSlot> },
    Leaf { key: NodeId, value: HashRef<NodeData> },
}

/// One populated slot of an internal node. Slots are kept sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieSlot {
    pub slot: u8,
    pub child: HashRef<TrieNode>,
}

impl TrieNode {
    pub fn empty() -> Self {
        Self::Internal {
            children: Vec::new(),
        }
    }

    pub fn leaf(key: NodeId, value: HashRef<NodeData>) -> Self {
        Self::Leaf { key, value }
    }

    fn child_at(children: &[TrieSlot], slot: u8) -> Option<HashRef<TrieNode>> {
        children
            .binary_search_by_key(&slot, |c| c.slot)
            .ok()
            .map(|pos| children[pos].child)
    }
}

impl StoredValue for TrieNode {
    const KIND: ObjectKind = ObjectKind::Trie;
}

fn slot(key: NodeId, level: u32) -> u8 {
    (key.raw().checked_shr(BITS_PER_LEVEL * level).unwrap_or(0) & LEVEL_MASK) as u8
}

fn expect_internal(node: &TrieNode) -> TreeResult<&[TrieSlot]> {
    match node {
        TrieNode::Internal { children } => Ok(children),
        TrieNode::Leaf { key, .. } => Err(TreeError::Corrupt(format!(
            "leaf for {key} where an internal trie node was expected"
        ))),
    }
}

pub(crate) fn write_empty(cache: &ObjectCache) -> TreeResult<HashRef<TrieNode>> {
    Ok(HashRef::write(TrieNode::empty(), cache)?)
}

/// Find the record stored under `key`.
pub(crate) fn get(
    cache: &ObjectCache,
    root: HashRef<TrieNode>,
    key: NodeId,
) -> TreeResult<Option<HashRef<NodeData>>> {
    let mut current = root.resolve(cache)?;
    let mut level = 0;
    loop {
        let next = match &*current {
            TrieNode::Leaf { key: found, value } => {
                return Ok((*found == key).then_some(*value));
            }
            TrieNode::Internal { children } => {
                match TrieNode::child_at(children, slot(key, level)) {
                    Some(child) => child,
                    None => return Ok(None),
                }
            }
        };
        current = next.resolve(cache)?;
        level += 1;
    }
}

/// Store `value` under `key`, returning the new root.
pub(crate) fn insert(
    cache: &ObjectCache,
    root: HashRef<TrieNode>,
    key: NodeId,
    value: HashRef<NodeData>,
) -> TreeResult<HashRef<TrieNode>> {
    let node = root.resolve(cache)?;
    let updated = insert_into(cache, &node, key, value, 0)?;
    Ok(HashRef::write(updated, cache)?)
}

fn insert_into(
    cache: &ObjectCache,
    node: &TrieNode,
    key: NodeId,
    value: HashRef<NodeData>,
    level: u32,
) -> TreeResult<TrieNode> {
    let mut children = expect_internal(node)?.to_vec();
    let target = slot(key, level);
    match children.binary_search_by_key(&target, |c| c.slot) {
        Ok(pos) => {
            let existing_ref = children[pos].child;
            let existing = existing_ref.resolve(cache)?;
            let replacement = match &*existing {
                TrieNode::Leaf { key: found, .. } if *found == key => TrieNode::leaf(key, value),
                TrieNode::Leaf { key: found, .. } => {
                    let added = HashRef::write(TrieNode::leaf(key, value), cache)?;
                    pair(cache, level + 1, (*found, existing_ref), (key, added))?
                }
                TrieNode::Internal { .. } => insert_into(cache, &existing, key, value, level + 1)?,
            };
            children[pos].child = HashRef::write(replacement, cache)?;
        }
        Err(pos) => {
            let leaf = HashRef::write(TrieNode::leaf(key, value), cache)?;
            children.insert(
                pos,
                TrieSlot {
                    slot: target,
                    child: leaf,
                },
            );
        }
    }
    Ok(TrieNode::Internal { children })
}

/// The internal node holding two leaves whose keys agree below `level`.
fn pair(
    cache: &ObjectCache,
    level: u32,
    a: (NodeId, HashRef<TrieNode>),
    b: (NodeId, HashRef<TrieNode>),
) -> TreeResult<TrieNode> {
    if level > MAX_LEVEL {
        return Err(TreeError::Corrupt(format!(
            "keys {} and {} cannot be separated",
            a.0, b.0
        )));
    }
    let (slot_a, slot_b) = (slot(a.0, level), slot(b.0, level));
    let children = if slot_a == slot_b {
        let inner = HashRef::write(pair(cache, level + 1, a, b)?, cache)?;
        vec![TrieSlot {
            slot: slot_a,
            child: inner,
        }]
    } else {
        let mut both = vec![
            TrieSlot {
                slot: slot_a,
                child: a.1,
            },
            TrieSlot {
                slot: slot_b,
                child: b.1,
            },
        ];
        both.sort_by_key(|c| c.slot);
        both
    };
    Ok(TrieNode::Internal { children })
}

enum Removal {
    Absent,
    Empty,
    Replaced(TrieNode),
}

/// Remove `key`, returning the new root, or `None` if the key was absent.
pub(crate) fn remove(
    cache: &ObjectCache,
    root: HashRef<TrieNode>,
    key: NodeId,
) -> TreeResult<Option<HashRef<TrieNode>>> {
    let node = root.resolve(cache)?;
    let updated = match remove_from(cache, &node, key, 0)? {
        Removal::Absent => return Ok(None),
        Removal::Empty => TrieNode::empty(),
        Removal::Replaced(node) => node,
    };
    Ok(Some(HashRef::write(updated, cache)?))
}

fn remove_from(
    cache: &ObjectCache,
    node: &TrieNode,
    key: NodeId,
    level: u32,
) -> TreeResult<Removal> {
    let children = expect_internal(node)?;
    let Ok(pos) = children.binary_search_by_key(&slot(key, level), |c| c.slot) else {
        return Ok(Removal::Absent);
    };
    let child = children[pos].child.resolve(cache)?;
    let mut children = children.to_vec();
    match &*child {
        TrieNode::Leaf { key: found, .. } => {
            if *found != key {
                return Ok(Removal::Absent);
            }
            children.remove(pos);
        }
        TrieNode::Internal { .. } => match remove_from(cache, &child, key, level + 1)? {
            Removal::Absent => return Ok(Removal::Absent),
            Removal::Empty => {
                children.remove(pos);
            }
            Removal::Replaced(node) => children[pos].child = HashRef::write(node, cache)?,
        },
    }

    if level > 0 {
        if children.is_empty() {
            return Ok(Removal::Empty);
        }
        if let [only] = children.as_slice() {
            let only = only.child.resolve(cache)?;
            if matches!(*only, TrieNode::Leaf { .. }) {
                return Ok(Removal::Replaced((*only).clone()));
            }
        }
    }
    Ok(Removal::Replaced(TrieNode::Internal { children }))
}

/// Bulk lookup of one key, one wave per trie level.
pub(crate) fn lookup(
    query: &BulkQuery,
    node: HashRef<TrieNode>,
    key: NodeId,
    level: u32,
) -> Value<Option<HashRef<NodeData>>> {
    let q = query.clone();
    query.get_required(node).map_bulk(move |trie| match &*trie {
        TrieNode::Leaf { key: found, value } => q.constant((*found == key).then_some(*value)),
        TrieNode::Internal { children } => match TrieNode::child_at(children, slot(key, level)) {
            Some(child) => lookup(&q, child, key, level + 1),
            None => q.constant(None),
        },
    })
}

/// Every `(key, record)` pair below `node`, one wave per trie level.
pub(crate) fn leaves(
    query: &BulkQuery,
    node: HashRef<TrieNode>,
) -> Value<Vec<(NodeId, HashRef<NodeData>)>> {
    let q = query.clone();
    query.get_required(node).map_bulk(move |trie| match &*trie {
        TrieNode::Leaf { key, value } => q.constant(vec![(*key, *value)]),
        TrieNode::Internal { children } => {
            let inner = q.clone();
            let refs: Vec<HashRef<TrieNode>> = children.iter().map(|c| c.child).collect();
            q.map(refs, move |child| leaves(&inner, child))
                .map(|parts| parts.into_iter().flatten().collect())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arbor_store::InMemoryObjectStore;
    use proptest::prelude::*;

    fn cache() -> Arc<ObjectCache> {
        Arc::new(ObjectCache::new(Arc::new(InMemoryObjectStore::new())))
    }

    fn record(cache: &ObjectCache, id: u64) -> HashRef<NodeData> {
        HashRef::write(NodeData::new(NodeId::new(id), None), cache).unwrap()
    }

    fn build(cache: &ObjectCache, keys: &[u64]) -> HashRef<TrieNode> {
        let mut root = write_empty(cache).unwrap();
        for &k in keys {
            root = insert(cache, root, NodeId::new(k), record(cache, k)).unwrap();
        }
        root
    }

    // -----------------------------------------------------------------------
    // Point operations
    // -----------------------------------------------------------------------

    #[test]
    fn insert_and_get() {
        let cache = cache();
        let root = build(&cache, &[1, 2, 33, 1025]);
        for k in [1, 2, 33, 1025] {
            assert_eq!(
                get(&cache, root, NodeId::new(k)).unwrap(),
                Some(record(&cache, k))
            );
        }
        assert_eq!(get(&cache, root, NodeId::new(65)).unwrap(), None);
    }

    #[test]
    fn shared_low_bits_descend() {
        // 1 and 1 + 2^40 agree on the first eight levels.
        let cache = cache();
        let far = 1 + (1u64 << 40);
        let root = build(&cache, &[1, far]);
        assert_eq!(
            get(&cache, root, NodeId::new(far)).unwrap(),
            Some(record(&cache, far))
        );
        assert_eq!(
            get(&cache, root, NodeId::new(1)).unwrap(),
            Some(record(&cache, 1))
        );
    }

    #[test]
    fn extreme_keys() {
        let cache = cache();
        let root = build(&cache, &[u64::MAX, u64::MAX >> 4, 0]);
        assert!(get(&cache, root, NodeId::new(u64::MAX)).unwrap().is_some());
        assert!(get(&cache, root, NodeId::new(u64::MAX >> 4)).unwrap().is_some());
    }

    #[test]
    fn overwrite_replaces_value() {
        let cache = cache();
        let root = build(&cache, &[7]);
        let other = HashRef::write(NodeData::new(NodeId::new(7), Some("C".into())), &cache).unwrap();
        let root = insert(&cache, root, NodeId::new(7), other).unwrap();
        assert_eq!(get(&cache, root, NodeId::new(7)).unwrap(), Some(other));
    }

    #[test]
    fn remove_absent_key_is_none() {
        let cache = cache();
        let root = build(&cache, &[1, 2]);
        assert!(remove(&cache, root, NodeId::new(3)).unwrap().is_none());
        assert!(remove(&cache, root, NodeId::new(33)).unwrap().is_none());
    }

    #[test]
    fn remove_everything_gives_empty_root() {
        let cache = cache();
        let mut root = build(&cache, &[1, 33, 65]);
        for k in [33, 1, 65] {
            root = remove(&cache, root, NodeId::new(k)).unwrap().unwrap();
        }
        assert_eq!(root, write_empty(&cache).unwrap());
    }

    // -----------------------------------------------------------------------
    // Canonical shape
    // -----------------------------------------------------------------------

    #[test]
    fn insertion_order_does_not_matter() {
        let cache = cache();
        let a = build(&cache, &[1, 33, 1057, 2, 99]);
        let b = build(&cache, &[99, 2, 1057, 33, 1]);
        assert_eq!(a, b);
    }

    #[test]
    fn removal_restores_previous_shape() {
        let cache = cache();
        let before = build(&cache, &[1, 2]);
        let after_insert = insert(&cache, before, NodeId::new(1 + (1 << 35)), record(&cache, 9)).unwrap();
        let after_remove = remove(&cache, after_insert, NodeId::new(1 + (1 << 35)))
            .unwrap()
            .unwrap();
        assert_eq!(after_remove, before);
    }

    proptest! {
        #[test]
        fn shape_depends_only_on_key_set(
            keys in proptest::collection::btree_set(any::<u64>(), 1..24),
            extra in proptest::collection::btree_set(any::<u64>(), 0..8),
        ) {
            let cache = cache();
            let keys: Vec<u64> = keys.into_iter().collect();
            let direct = build(&cache, &keys);

            let mut with_extra: Vec<u64> = keys.clone();
            with_extra.extend(extra.iter().filter(|e| !keys.contains(e)));
            let mut root = build(&cache, &with_extra);
            for e in extra.iter().filter(|e| !keys.contains(e)) {
                root = remove(&cache, root, NodeId::new(*e)).unwrap().unwrap();
            }
            prop_assert_eq!(root, direct);
        }
    }

    // -----------------------------------------------------------------------
    // Bulk reads
    // -----------------------------------------------------------------------

    #[test]
    fn bulk_lookup_and_leaves() {
        let cache = cache();
        let keys = [1u64, 2, 33, 1025, 1 + (1 << 20)];
        let root = build(&cache, &keys);
        let fresh = Arc::new(ObjectCache::new(Arc::clone(cache.store())));

        let query = BulkQuery::new(Arc::clone(&fresh));
        let found = lookup(&query, root, NodeId::new(33), 0).execute().unwrap();
        assert_eq!(found, Some(record(&cache, 33)));

        let query = BulkQuery::new(fresh);
        let mut all: Vec<u64> = leaves(&query, root)
            .execute()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.raw())
            .collect();
        all.sort();
        assert_eq!(all, keys.to_vec());
    }
}
