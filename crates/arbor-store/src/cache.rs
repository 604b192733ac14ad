use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::object::{StoredObject, StoredValue};
use crate::traits::ObjectStore;

type CachedValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Entries {
    values: HashMap<ContentHash, CachedValue>,
    order: VecDeque<ContentHash>,
}

/// One store session: a backing store plus the values already decoded from
/// it.
///
/// Every [`HashRef`](crate::HashRef) resolved through the same cache shares
/// the decoded value for its hash, so a value is fetched and decoded at most
/// once while it stays cached. A hash always names the same content, so
/// entries are never invalidated. A bounded cache evicts its oldest entries
/// first.
///
/// A session opened with [`child`](Self::child) also sees the values its
/// parent has decoded, without adding to them.
pub struct ObjectCache {
    store: Arc<dyn ObjectStore>,
    parent: Option<Arc<ObjectCache>>,
    capacity: Option<usize>,
    entries: RwLock<Entries>,
}

impl ObjectCache {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            parent: None,
            capacity: None,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// A cache holding at most `capacity` decoded values.
    pub fn bounded(store: Arc<dyn ObjectStore>, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(store)
        }
    }

    /// A short-lived session over `store` that falls back to `parent` for
    /// values it has not decoded itself.
    pub fn child(parent: &Arc<ObjectCache>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            ..Self::new(store)
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of decoded values held.
    pub fn cached_count(&self) -> usize {
        self.entries.read().expect("lock poisoned").values.len()
    }

    /// The decoded value for `hash`, if this session or its parent has
    /// already seen it.
    pub fn cached<T: StoredValue>(&self, hash: &ContentHash) -> Option<Arc<T>> {
        let own = self
            .entries
            .read()
            .expect("lock poisoned")
            .values
            .get(hash)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok());
        own.or_else(|| self.parent.as_ref().and_then(|parent| parent.cached(hash)))
    }

    /// Verify and decode a fetched object, then remember the value.
    pub fn decode<T: StoredValue>(
        &self,
        hash: &ContentHash,
        object: &StoredObject,
    ) -> StoreResult<Arc<T>> {
        if let Some(value) = self.cached::<T>(hash) {
            return Ok(value);
        }
        object.verify(hash)?;
        let value = Arc::new(T::from_stored_object(object)?);
        self.remember(*hash, Arc::clone(&value));
        Ok(value)
    }

    /// Fetch and decode a single value, or `None` if the store lacks it.
    pub fn get<T: StoredValue>(&self, hash: &ContentHash) -> StoreResult<Option<Arc<T>>> {
        if let Some(value) = self.cached::<T>(hash) {
            return Ok(Some(value));
        }
        match self.store.read(hash)? {
            Some(object) => self.decode(hash, &object).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but a missing value is an error.
    pub fn require<T: StoredValue>(&self, hash: &ContentHash) -> StoreResult<Arc<T>> {
        self.get(hash)?.ok_or(StoreError::NotFound(*hash))
    }

    /// Encode and store a value, remembering it for later resolution.
    pub fn put<T: StoredValue>(&self, value: T) -> StoreResult<ContentHash> {
        let object = value.to_stored_object()?;
        let hash = self.store.write(&object)?;
        self.remember(hash, Arc::new(value));
        Ok(hash)
    }

    fn remember<T: StoredValue>(&self, hash: ContentHash, value: Arc<T>) {
        if self.capacity == Some(0) {
            return;
        }
        let mut entries = self.entries.write().expect("lock poisoned");
        if entries.values.contains_key(&hash) {
            return;
        }
        entries.values.insert(hash, value);
        entries.order.push_back(hash);
        if let Some(capacity) = self.capacity {
            while entries.values.len() > capacity {
                match entries.order.pop_front() {
                    Some(oldest) => {
                        entries.values.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("cached_count", &self.cached_count())
            .field("capacity", &self.capacity)
            .field("child", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::CountingObjectStore;
    use crate::memory::InMemoryObjectStore;
    use crate::object::tests::Note;
    use crate::object::ObjectKind;

    #[test]
    fn put_then_get_uses_cache() {
        let store = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let cache = ObjectCache::new(store.clone());
        let hash = cache.put(Note::new("cached")).unwrap();

        let value = cache.require::<Note>(&hash).unwrap();
        assert_eq!(value.title, "cached");
        assert_eq!(store.reads(), 0);
    }

    #[test]
    fn second_get_does_not_hit_store() {
        let backing = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let hash = backing
            .write(&Note::new("x").to_stored_object().unwrap())
            .unwrap();
        let cache = ObjectCache::new(backing.clone());

        cache.require::<Note>(&hash).unwrap();
        cache.require::<Note>(&hash).unwrap();
        assert_eq!(backing.reads(), 1);
        assert_eq!(cache.cached_count(), 1);
    }

    #[test]
    fn missing_value() {
        let cache = ObjectCache::new(Arc::new(InMemoryObjectStore::new()));
        let hash = ContentHash::from_bytes(b"absent");
        assert!(cache.get::<Note>(&hash).unwrap().is_none());
        assert!(matches!(
            cache.require::<Note>(&hash),
            Err(StoreError::NotFound(h)) if h == hash
        ));
    }

    #[test]
    fn tampered_bytes_fail_verification() {
        let store = Arc::new(InMemoryObjectStore::new());
        let hash = store
            .write(&Note::new("real").to_stored_object().unwrap())
            .unwrap();
        store.tamper(hash, Note::new("fake").to_stored_object().unwrap());

        let cache = ObjectCache::new(store);
        assert!(matches!(
            cache.get::<Note>(&hash),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[test]
    fn wrong_kind_fails_decoding() {
        let store = Arc::new(InMemoryObjectStore::new());
        let obj = StoredObject::new(ObjectKind::Tree, br#"{"title":"t","tags":{}}"#.to_vec());
        let hash = store.write(&obj).unwrap();
        let cache = ObjectCache::new(store);
        assert!(matches!(
            cache.get::<Note>(&hash),
            Err(StoreError::CorruptObject { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Bounds and child sessions
    // -----------------------------------------------------------------------

    #[test]
    fn bounded_cache_evicts_oldest() {
        let store = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let cache = ObjectCache::bounded(store.clone(), 2);
        let first = cache.put(Note::new("a")).unwrap();
        cache.put(Note::new("b")).unwrap();
        cache.put(Note::new("c")).unwrap();
        assert_eq!(cache.cached_count(), 2);
        assert!(cache.cached::<Note>(&first).is_none());

        assert_eq!(cache.require::<Note>(&first).unwrap().title, "a");
        assert_eq!(store.reads(), 1);
        assert_eq!(cache.cached_count(), 2);
    }

    #[test]
    fn child_reads_parent_values_without_growing_it() {
        let store = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let parent = Arc::new(ObjectCache::new(store.clone()));
        let shared = parent.put(Note::new("shared")).unwrap();

        let child = ObjectCache::child(&parent, store.clone());
        assert_eq!(child.require::<Note>(&shared).unwrap().title, "shared");
        assert_eq!(store.reads(), 0);

        let own = child.put(Note::new("own")).unwrap();
        assert!(child.cached::<Note>(&own).is_some());
        assert!(parent.cached::<Note>(&own).is_none());
        assert_eq!(parent.cached_count(), 1);
    }

    #[test]
    fn poisoned_lock_is_not_hidden() {
        let cache = Arc::new(ObjectCache::new(Arc::new(InMemoryObjectStore::new())));
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().expect("lock poisoned");
            panic!("writer died holding the lock");
        })
        .join();

        let counted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cache.cached_count()));
        assert!(counted.is_err());
    }
}
