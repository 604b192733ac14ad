//! Operation log compaction.
//!
//! Compression drops operations whose effect is overwritten later in the same
//! log. Replaying the compressed log on the tree the original log started from
//! gives the same tree.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use arbor_tree::Operation;
use arbor_types::NodeId;

/// Removes superseded operations from a log.
///
/// Rules, applied in order:
///
/// 1. A property or reference write is dropped when a later write to the same
///    slot follows before the node is deleted or re-added.
/// 2. Writes to a node that is deleted later in the log are dropped.
/// 3. Back-to-back moves of the same node collapse into the last one.
/// 4. A node that is added, only written to, and deleted again vanishes from
///    the log.
///
/// [`Operation::RevertTo`] is opaque and acts as a barrier for every rule.
#[derive(Debug, Default, Clone, Copy)]
pub struct OperationsCompressor;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Slot<'a> {
    Property(NodeId, &'a str),
    Reference(NodeId, &'a str),
}

impl OperationsCompressor {
    pub fn new() -> Self {
        Self
    }

    pub fn compress(&self, operations: Vec<Operation>) -> Vec<Operation> {
        let before = operations.len();
        let kept = drop_overwritten(&operations);
        let ops: Vec<Operation> = operations
            .into_iter()
            .zip(kept)
            .filter_map(|(op, keep)| keep.then_some(op))
            .collect();
        let ops = collapse_moves(ops);
        let ops = drop_transient_nodes(ops);
        if ops.len() != before {
            debug!(before, after = ops.len(), "compressed operations");
        }
        ops
    }
}

/// Rules 1 and 2: scan backwards remembering which slots are written later
/// and which nodes are deleted later.
fn drop_overwritten(operations: &[Operation]) -> Vec<bool> {
    let mut keep = vec![true; operations.len()];
    let mut written: HashSet<Slot<'_>> = HashSet::new();
    let mut deleted: HashSet<NodeId> = HashSet::new();

    for (index, op) in operations.iter().enumerate().rev() {
        let slot = match op {
            Operation::SetProperty { node, role, .. } => Slot::Property(*node, role),
            Operation::SetReference { node, role, .. } => Slot::Reference(*node, role),
            Operation::DeleteNode { node } => {
                forget(&mut written, *node);
                deleted.insert(*node);
                continue;
            }
            Operation::AddNewChild { child, .. } => {
                forget(&mut written, *child);
                deleted.remove(child);
                continue;
            }
            Operation::MoveNode { .. } => continue,
            Operation::RevertTo { .. } => {
                written.clear();
                deleted.clear();
                continue;
            }
        };
        let node = match slot {
            Slot::Property(node, _) | Slot::Reference(node, _) => node,
        };
        if deleted.contains(&node) || !written.insert(slot) {
            keep[index] = false;
        }
    }
    keep
}

fn forget(written: &mut HashSet<Slot<'_>>, node: NodeId) {
    written.retain(|slot| match slot {
        Slot::Property(id, _) | Slot::Reference(id, _) => *id != node,
    });
}

/// Rule 3.
fn collapse_moves(operations: Vec<Operation>) -> Vec<Operation> {
    let mut out: Vec<Operation> = Vec::with_capacity(operations.len());
    for op in operations {
        if let (Operation::MoveNode { node, .. }, Some(Operation::MoveNode { node: last, .. })) =
            (&op, out.last())
        {
            if node == last {
                out.pop();
            }
        }
        out.push(op);
    }
    out
}

/// Rule 4. After rules 1 and 2 a transient node shows up as an add directly
/// followed by its delete.
fn drop_transient_nodes(operations: Vec<Operation>) -> Vec<Operation> {
    let mut added_at: HashMap<NodeId, usize> = HashMap::new();
    let mut out: Vec<Operation> = Vec::with_capacity(operations.len());
    for op in operations {
        match &op {
            Operation::DeleteNode { node } => {
                if let Some(index) = added_at.remove(node) {
                    if index + 1 == out.len() {
                        out.pop();
                        continue;
                    }
                }
            }
            Operation::AddNewChild { child, .. } => {
                added_at.insert(*child, out.len());
            }
            _ => {}
        }
        out.push(op);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::{NoRevert, TreeSnapshot};
    use arbor_types::{ContentHash, NodeRef};
    use proptest::prelude::*;

    fn set(node: u64, role: &str, value: &str) -> Operation {
        Operation::SetProperty {
            node: NodeId::new(node),
            role: role.into(),
            value: Some(value.into()),
        }
    }

    fn add(parent: u64, child: u64) -> Operation {
        Operation::AddNewChild {
            parent: NodeId::new(parent),
            role: "items".into(),
            index: None,
            child: NodeId::new(child),
            concept: None,
        }
    }

    fn delete(node: u64) -> Operation {
        Operation::DeleteNode {
            node: NodeId::new(node),
        }
    }

    fn mv(node: u64, parent: u64, index: Option<usize>) -> Operation {
        Operation::MoveNode {
            node: NodeId::new(node),
            parent: NodeId::new(parent),
            role: "items".into(),
            index,
        }
    }

    fn compress(ops: Vec<Operation>) -> Vec<Operation> {
        OperationsCompressor::new().compress(ops)
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    #[test]
    fn repeated_writes_collapse_to_last() {
        let ops = vec![set(1, "name", "a"), set(1, "other", "x"), set(1, "name", "b")];
        assert_eq!(compress(ops), vec![set(1, "other", "x"), set(1, "name", "b")]);
    }

    #[test]
    fn reference_writes_collapse() {
        let reference = |target: u64| Operation::SetReference {
            node: NodeId::ROOT,
            role: "r".into(),
            target: Some(NodeRef::Local(NodeId::new(target))),
        };
        assert_eq!(compress(vec![reference(2), reference(3)]), vec![reference(3)]);
    }

    #[test]
    fn writes_before_delete_are_dropped() {
        let ops = vec![add(1, 3), add(1, 2), set(2, "name", "a"), delete(2)];
        assert_eq!(compress(ops), vec![add(1, 3)]);
    }

    #[test]
    fn readded_node_keeps_later_writes() {
        let ops = vec![
            set(2, "name", "old"),
            delete(2),
            add(1, 2),
            set(2, "name", "new"),
        ];
        assert_eq!(
            compress(ops),
            vec![delete(2), add(1, 2), set(2, "name", "new")]
        );
    }

    #[test]
    fn adjacent_moves_collapse() {
        let ops = vec![mv(2, 1, Some(0)), mv(2, 3, None), mv(4, 1, None)];
        assert_eq!(compress(ops), vec![mv(2, 3, None), mv(4, 1, None)]);
    }

    #[test]
    fn separated_moves_are_kept() {
        let ops = vec![mv(2, 1, Some(0)), mv(3, 1, Some(0)), mv(2, 1, Some(1))];
        assert_eq!(compress(ops.clone()), ops);
    }

    #[test]
    fn transient_node_needs_adjacent_delete() {
        let ops = vec![add(1, 2), add(1, 3), delete(2)];
        assert_eq!(compress(ops.clone()), ops);
    }

    #[test]
    fn revert_is_a_barrier() {
        let revert = Operation::RevertTo {
            from: ContentHash::from_bytes(b"a"),
            to: ContentHash::from_bytes(b"b"),
        };
        let ops = vec![set(1, "name", "a"), revert.clone(), set(1, "name", "b")];
        assert_eq!(compress(ops.clone()), ops);
    }

    #[test]
    fn empty_log_stays_empty() {
        assert!(compress(Vec::new()).is_empty());
    }

    // -----------------------------------------------------------------------
    // Net effect
    // -----------------------------------------------------------------------

    /// Builds a valid random log against a small evolving tree.
    fn random_log(choices: &[(u8, u8, u8)]) -> Vec<Operation> {
        let mut snapshot = TreeSnapshot::new();
        let mut ops = Vec::new();
        let mut next_id = 2u64;
        for &(kind, pick, value) in choices {
            let ids: Vec<NodeId> = snapshot.iter().map(|n| n.id).collect();
            let node = ids[pick as usize % ids.len()];
            let role = ["a", "b"][value as usize % 2];
            let op = match kind % 6 {
                0 | 1 => set(node.raw(), role, &value.to_string()),
                2 => {
                    next_id += 1;
                    add(node.raw(), next_id)
                }
                3 => Operation::SetReference {
                    node,
                    role: role.into(),
                    target: Some(NodeRef::Local(ids[value as usize % ids.len()])),
                },
                4 => {
                    let parity = u64::from(value % 2);
                    let leaf = snapshot
                        .iter()
                        .find(|n| !n.id.is_root() && !n.has_children() && n.id.raw() % 2 == parity)
                        .map(|n| n.id);
                    match leaf {
                        Some(leaf) => delete(leaf.raw()),
                        None => continue,
                    }
                }
                _ => {
                    if node.is_root() {
                        continue;
                    }
                    mv(node.raw(), 1, Some(0))
                }
            };
            let mut next = snapshot.clone();
            if op.apply(&mut next, &NoRevert).is_ok() {
                snapshot = next;
                ops.push(op);
            }
        }
        ops
    }

    fn replay(ops: &[Operation]) -> TreeSnapshot {
        let mut snapshot = TreeSnapshot::new();
        for op in ops {
            op.apply(&mut snapshot, &NoRevert).unwrap();
        }
        snapshot
    }

    proptest! {
        #[test]
        fn compression_preserves_net_effect(
            choices in prop::collection::vec((any::<u8>(), any::<u8>(), any::<u8>()), 0..60)
        ) {
            let ops = random_log(&choices);
            let compressed = compress(ops.clone());
            prop_assert!(compressed.len() <= ops.len());
            prop_assert_eq!(replay(&compressed), replay(&ops));
        }
    }
}
