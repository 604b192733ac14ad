//! Tree-level diff: compare two trees and produce the edits between them.
//!
//! The edits are generated against a scratch copy of the old tree and each
//! one is applied as it is emitted, so indices always refer to the list as
//! it is at that point of the replay.
//!
//! 1. Nodes whose id survives but whose concept changed cannot be edited in
//!    place. Their children are parked under the root and the node is
//!    deleted, to be added again in step 2.
//! 2. Breadth-first over the new tree, every child list is rebuilt index by
//!    index: a node already at its target position is left alone, a
//!    surviving node is moved there, a new node is added there.
//! 3. Properties and references are set to their new values.
//! 4. Nodes absent from the new tree are deleted, children first.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use arbor_tree::{NodeTable, NoRevert, Operation, Tree, TreeSnapshot};
use arbor_types::NodeId;

use crate::error::{DiffError, DiffResult};

/// Role on the root that holds children of replaced nodes during a replay.
const PARKING_ROLE: &str = "$parked";

/// Compare two stored trees.
pub fn diff_trees(old: &Tree, new: &Tree) -> DiffResult<Vec<Operation>> {
    if old.index_root() == new.index_root() {
        return Ok(Vec::new());
    }
    diff_snapshots(&old.load_snapshot()?, &new.load_snapshot()?)
}

/// Compute the edits turning `old` into `new`.
pub fn diff_snapshots(old: &TreeSnapshot, new: &TreeSnapshot) -> DiffResult<Vec<Operation>> {
    let (Some(old_root), Some(new_root)) = (old.root(), new.root()) else {
        return Err(DiffError::UnsupportedChange("tree without root".into()));
    };
    if old_root.concept != new_root.concept {
        return Err(DiffError::UnsupportedChange(format!(
            "root concept changed from {:?} to {:?}",
            old_root.concept, new_root.concept
        )));
    }

    let mut replay = Replay {
        working: old.clone(),
        ops: Vec::new(),
    };
    replay.replace_changed_concepts(old, new)?;
    replay.place_children(new)?;
    replay.copy_values(new)?;
    replay.delete_leftovers(new)?;

    debug!(
        old_nodes = old.len(),
        new_nodes = new.len(),
        operations = replay.ops.len(),
        "computed tree diff"
    );
    Ok(replay.ops)
}

struct Replay {
    working: TreeSnapshot,
    ops: Vec<Operation>,
}

impl Replay {
    fn emit(&mut self, op: Operation) -> DiffResult<()> {
        op.apply(&mut self.working, &NoRevert)?;
        self.ops.push(op);
        Ok(())
    }

    fn replace_changed_concepts(&mut self, old: &TreeSnapshot, new: &TreeSnapshot) -> DiffResult<()> {
        let replaced: Vec<NodeId> = old
            .descendants(NodeId::ROOT)
            .into_iter()
            .filter(|id| {
                matches!(
                    (old.get(*id), new.get(*id)),
                    (Some(a), Some(b)) if a.concept != b.concept
                )
            })
            .collect();
        for id in replaced {
            let children: Vec<NodeId> = self.working.require(id)?.all_children().collect();
            for child in children {
                self.emit(Operation::MoveNode {
                    node: child,
                    parent: NodeId::ROOT,
                    role: PARKING_ROLE.to_string(),
                    index: None,
                })?;
            }
            self.emit(Operation::DeleteNode { node: id })?;
        }
        Ok(())
    }

    fn place_children(&mut self, new: &TreeSnapshot) -> DiffResult<()> {
        let mut queue = VecDeque::from([NodeId::ROOT]);
        while let Some(parent) = queue.pop_front() {
            let Some(target) = new.get(parent) else {
                continue;
            };
            for (role, children) in &target.children {
                for (index, &child) in children.iter().enumerate() {
                    queue.push_back(child);
                    let current = self.working.require(parent)?;
                    if current.children_in(role).get(index) == Some(&child) {
                        continue;
                    }
                    let op = if self.working.contains(child) {
                        Operation::MoveNode {
                            node: child,
                            parent,
                            role: role.clone(),
                            index: Some(index),
                        }
                    } else {
                        Operation::AddNewChild {
                            parent,
                            role: role.clone(),
                            index: Some(index),
                            child,
                            concept: new.get(child).and_then(|n| n.concept.clone()),
                        }
                    };
                    self.emit(op)?;
                }
            }
        }
        Ok(())
    }

    fn copy_values(&mut self, new: &TreeSnapshot) -> DiffResult<()> {
        for target in new.iter() {
            let Some(current) = self.working.get(target.id).cloned() else {
                continue;
            };
            let roles: BTreeSet<&String> = current
                .properties
                .keys()
                .chain(target.properties.keys())
                .collect();
            for role in roles {
                let wanted = target.properties.get(role);
                if current.properties.get(role) != wanted {
                    self.emit(Operation::SetProperty {
                        node: target.id,
                        role: role.clone(),
                        value: wanted.cloned(),
                    })?;
                }
            }
            let roles: BTreeSet<&String> = current
                .references
                .keys()
                .chain(target.references.keys())
                .collect();
            for role in roles {
                let wanted = target.references.get(role);
                if current.references.get(role) != wanted {
                    self.emit(Operation::SetReference {
                        node: target.id,
                        role: role.clone(),
                        target: wanted.cloned(),
                    })?;
                }
            }
        }
        Ok(())
    }

    fn delete_leftovers(&mut self, new: &TreeSnapshot) -> DiffResult<()> {
        let doomed: Vec<NodeId> = self
            .working
            .descendants(NodeId::ROOT)
            .into_iter()
            .rev()
            .filter(|id| !new.contains(*id))
            .collect();
        for node in doomed {
            self.emit(Operation::DeleteNode { node })?;
        }
        Ok(())
    }
}
