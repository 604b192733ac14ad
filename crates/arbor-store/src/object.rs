use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use arbor_crypto::ContentHasher;
use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A single tree node: concept, properties, children, references.
    Node,
    /// An internal or leaf node of a tree's id → node index.
    Trie,
    /// A tree record: tree id plus the root of its node index.
    Tree,
    /// A version record.
    Version,
    /// An operation list stored outside its version.
    Operations,
}

impl ObjectKind {
    /// The domain-separated hasher used for this kind.
    pub fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Node => &ContentHasher::NODE,
            Self::Trie => &ContentHasher::TRIE,
            Self::Tree => &ContentHasher::TREE,
            Self::Version => &ContentHasher::VERSION,
            Self::Operations => &ContentHasher::OPERATIONS,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Trie => write!(f, "trie"),
            Self::Tree => write!(f, "tree"),
            Self::Version => write!(f, "version"),
            Self::Operations => write!(f, "operations"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// contents of the data -- it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed hash for this object.
    pub fn compute_id(&self) -> ContentHash {
        self.kind.hasher().hash(&self.data)
    }

    /// Check that this object is what `expected` claims to address.
    pub fn verify(&self, expected: &ContentHash) -> StoreResult<()> {
        let computed = self.compute_id();
        if computed != *expected {
            return Err(StoreError::HashMismatch {
                id: *expected,
                computed,
            });
        }
        Ok(())
    }
}

/// A value with a fixed object kind and a deterministic encoding.
///
/// The encoding is JSON; implementors keep every map a `BTreeMap` so that the
/// same logical value always yields the same bytes and therefore the same
/// hash.
pub trait StoredValue: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The kind every value of this type is stored under.
    const KIND: ObjectKind;

    /// Encode into a `StoredObject` for storage.
    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(Self::KIND, data))
    }

    /// Decode from a `StoredObject`.
    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("expected {}, got {}", Self::KIND, obj.kind),
            });
        }
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason: e.to_string(),
        })
    }

    /// The hash this value is stored under.
    fn content_hash(&self) -> StoreResult<ContentHash> {
        Ok(self.to_stored_object()?.compute_id())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Small value type used by the store tests.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub(crate) struct Note {
        pub title: String,
        pub tags: BTreeMap<String, String>,
    }

    impl Note {
        pub(crate) fn new(title: &str) -> Self {
            Self {
                title: title.to_string(),
                tags: BTreeMap::new(),
            }
        }
    }

    impl StoredValue for Note {
        const KIND: ObjectKind = ObjectKind::Node;
    }

    #[test]
    fn value_roundtrip() {
        let mut note = Note::new("hello");
        note.tags.insert("a".into(), "1".into());
        let stored = note.to_stored_object().unwrap();
        assert_eq!(stored.kind, ObjectKind::Node);
        assert_eq!(Note::from_stored_object(&stored).unwrap(), note);
    }

    #[test]
    fn kind_mismatch_is_corruption() {
        let stored = StoredObject::new(ObjectKind::Version, b"{}".to_vec());
        let err = Note::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn garbage_bytes_are_corruption() {
        let stored = StoredObject::new(ObjectKind::Node, b"not json".to_vec());
        let err = Note::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut a = Note::new("x");
        a.tags.insert("b".into(), "2".into());
        a.tags.insert("a".into(), "1".into());
        let mut b = Note::new("x");
        b.tags.insert("a".into(), "1".into());
        b.tags.insert("b".into(), "2".into());
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
    }

    #[test]
    fn different_kinds_produce_different_ids() {
        let data = b"same data".to_vec();
        let node = StoredObject::new(ObjectKind::Node, data.clone());
        let tree = StoredObject::new(ObjectKind::Tree, data.clone());
        let version = StoredObject::new(ObjectKind::Version, data);
        assert_ne!(node.compute_id(), tree.compute_id());
        assert_ne!(node.compute_id(), version.compute_id());
    }

    #[test]
    fn verify_detects_mismatch() {
        let obj = StoredObject::new(ObjectKind::Node, b"payload".to_vec());
        assert!(obj.verify(&obj.compute_id()).is_ok());
        let wrong = ContentHash::from_bytes(b"other");
        assert!(matches!(
            obj.verify(&wrong),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn object_kind_display() {
        assert_eq!(format!("{}", ObjectKind::Node), "node");
        assert_eq!(format!("{}", ObjectKind::Trie), "trie");
        assert_eq!(format!("{}", ObjectKind::Operations), "operations");
    }
}
