//! Resolution of revert operations against the version DAG.

use std::sync::Arc;

use arbor_diff::diff_trees;
use arbor_store::{HashRef, ObjectCache};
use arbor_tree::{Operation, RevertResolver, TreeError, TreeResult};
use arbor_types::ContentHash;

use crate::error::VersionResult;
use crate::version::Version;

/// Expands [`Operation::RevertTo`] by diffing the trees of the two versions.
#[derive(Clone)]
pub struct VersionRevertResolver {
    cache: Arc<ObjectCache>,
}

impl VersionRevertResolver {
    pub fn new(cache: Arc<ObjectCache>) -> Self {
        Self { cache }
    }

    fn operations(&self, from: ContentHash, to: ContentHash) -> VersionResult<Vec<Operation>> {
        let from = Version::load(Arc::clone(&self.cache), HashRef::new(from))?.tree()?;
        let to = Version::load(Arc::clone(&self.cache), HashRef::new(to))?.tree()?;
        Ok(diff_trees(&from, &to)?)
    }
}

impl RevertResolver for VersionRevertResolver {
    fn revert_operations(&self, from: ContentHash, to: ContentHash) -> TreeResult<Vec<Operation>> {
        self.operations(from, to)
            .map_err(|source| TreeError::Revert {
                from,
                to,
                source: Box::new(source),
            })
    }
}

impl std::fmt::Debug for VersionRevertResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionRevertResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::InMemoryObjectStore;
    use arbor_tree::{NodeTable, Tree};
    use arbor_types::{ErrorClass, NodeId, TreeId};

    use crate::version::VersionBuilder;

    fn setup() -> Arc<ObjectCache> {
        Arc::new(ObjectCache::new(Arc::new(InMemoryObjectStore::new())))
    }

    fn commit(tree: &mut Tree, id: u64, base: Option<&Version>, ops: Vec<Operation>) -> Version {
        let resolver = VersionRevertResolver::new(Arc::clone(tree.cache()));
        for op in &ops {
            tree.apply(op, &resolver).unwrap();
        }
        VersionBuilder::regular(id, tree.clone())
            .base(base)
            .operations(ops)
            .build()
            .unwrap()
    }

    #[test]
    fn revert_restores_older_tree() {
        let cache = setup();
        let mut tree = Tree::new(Arc::clone(&cache), TreeId::new("t")).unwrap();
        let v1 = commit(
            &mut tree,
            1,
            None,
            vec![Operation::SetProperty {
                node: NodeId::ROOT,
                role: "name".into(),
                value: Some("Foo".into()),
            }],
        );
        let v2 = commit(
            &mut tree,
            2,
            Some(&v1),
            vec![Operation::AddNewChild {
                parent: NodeId::ROOT,
                role: "items".into(),
                index: None,
                child: NodeId::new(2),
                concept: Some("Item".into()),
            }],
        );

        let revert = Operation::RevertTo {
            from: v2.content_hash(),
            to: v1.content_hash(),
        };
        let v3 = commit(&mut tree, 3, Some(&v2), vec![revert.clone()]);

        assert_eq!(v3.tree().unwrap(), v1.tree().unwrap());
        assert!(!tree.contains(NodeId::new(2)).unwrap());
        assert_eq!(v3.operations().unwrap(), vec![revert]);
    }

    #[test]
    fn revert_inverse_redoes_the_change() {
        let cache = setup();
        let resolver = VersionRevertResolver::new(Arc::clone(&cache));
        let mut tree = Tree::new(Arc::clone(&cache), TreeId::new("t")).unwrap();
        let v1 = commit(&mut tree, 1, None, vec![]);
        let v2 = commit(
            &mut tree,
            2,
            Some(&v1),
            vec![Operation::SetProperty {
                node: NodeId::ROOT,
                role: "name".into(),
                value: Some("Bar".into()),
            }],
        );

        let applied = tree
            .apply(
                &Operation::RevertTo {
                    from: v2.content_hash(),
                    to: v1.content_hash(),
                },
                &resolver,
            )
            .unwrap();
        assert_eq!(tree, v1.tree().unwrap());
        for op in applied.inverse() {
            tree.apply(op, &resolver).unwrap();
        }
        assert_eq!(tree, v2.tree().unwrap());
    }

    #[test]
    fn unknown_version_fails_as_not_found() {
        let cache = setup();
        let resolver = VersionRevertResolver::new(Arc::clone(&cache));
        let mut tree = Tree::new(cache, TreeId::new("t")).unwrap();
        let err = tree
            .apply(
                &Operation::RevertTo {
                    from: ContentHash::from_bytes(b"x"),
                    to: ContentHash::from_bytes(b"y"),
                },
                &resolver,
            )
            .unwrap_err();
        assert!(matches!(err, TreeError::Revert { .. }));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }
}
