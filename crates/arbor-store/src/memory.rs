use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tracing::debug;

use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// `HashMap` backend for tests and single-process embedding.
///
/// The store can be switched offline, after which every call fails with
/// [`StoreError::Unavailable`] the way a networked backend would when its
/// transport is down.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ContentHash, StoredObject>>,
    offline: AtomicBool,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored objects per kind.
    pub fn count_by_kind(&self) -> BTreeMap<String, usize> {
        let objects = self.objects.read().expect("lock poisoned");
        let mut counts = BTreeMap::new();
        for object in objects.values() {
            *counts.entry(object.kind.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of stored objects of `kind`.
    pub fn count_of(&self, kind: ObjectKind) -> usize {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|object| object.kind == kind)
            .count()
    }

    /// Simulate losing (or regaining) the connection to the backend.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    /// Replace the bytes stored under `id` without rehashing.
    #[cfg(test)]
    pub(crate) fn tamper(&self, id: ContentHash, object: StoredObject) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(id, object);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ContentHash) -> StoreResult<Option<StoredObject>> {
        self.check_online()?;
        Ok(self.objects.read().expect("lock poisoned").get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ContentHash> {
        self.check_online()?;
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullHash);
        }
        let mut objects = self.objects.write().expect("lock poisoned");
        if !objects.contains_key(&id) {
            debug!(id = %id.short_hex(), kind = %object.kind, size = object.size, "stored object");
            objects.insert(id, object.clone());
        }
        Ok(id)
    }

    fn exists(&self, id: &ContentHash) -> StoreResult<bool> {
        self.check_online()?;
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    fn delete(&self, id: &ContentHash) -> StoreResult<bool> {
        self.check_online()?;
        Ok(self.objects.write().expect("lock poisoned").remove(id).is_some())
    }

    fn read_batch(
        &self,
        ids: &[ContentHash],
    ) -> StoreResult<HashMap<ContentHash, Option<StoredObject>>> {
        self.check_online()?;
        let objects = self.objects.read().expect("lock poisoned");
        Ok(ids
            .iter()
            .map(|id| (*id, objects.get(id).cloned()))
            .collect())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("objects", &self.len())
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish()
    }
}
