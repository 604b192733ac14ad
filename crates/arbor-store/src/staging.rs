use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use arbor_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Write overlay over another store.
///
/// Writes stay in the overlay until [`publish`](Self::publish) copies chosen
/// objects to the backing store. Reads see staged objects first and fall
/// through to the backing store. Dropping the overlay discards whatever was
/// never published.
pub struct StagingObjectStore {
    backing: Arc<dyn ObjectStore>,
    staged: RwLock<HashMap<ContentHash, StoredObject>>,
}

impl StagingObjectStore {
    pub fn new(backing: Arc<dyn ObjectStore>) -> Self {
        Self {
            backing,
            staged: RwLock::new(HashMap::new()),
        }
    }

    pub fn backing(&self) -> &Arc<dyn ObjectStore> {
        &self.backing
    }

    /// Number of objects written to the overlay and not yet published.
    pub fn staged_len(&self) -> usize {
        self.staged.read().expect("lock poisoned").len()
    }

    pub fn is_staged(&self, id: &ContentHash) -> bool {
        self.staged.read().expect("lock poisoned").contains_key(id)
    }

    /// Copy the staged objects named by `ids` to the backing store in one
    /// batch and drop them from the overlay. Ids that are not staged are
    /// skipped. Returns the number of objects published.
    pub fn publish(&self, ids: &[ContentHash]) -> StoreResult<usize> {
        let mut staged = self.staged.write().expect("lock poisoned");
        let objects: Vec<StoredObject> = ids
            .iter()
            .filter_map(|id| staged.get(id).cloned())
            .collect();
        if objects.is_empty() {
            return Ok(0);
        }
        self.backing.write_batch(&objects)?;
        for id in ids {
            staged.remove(id);
        }
        debug!(published = objects.len(), discarded = staged.len(), "published staged objects");
        Ok(objects.len())
    }

    /// Forget everything staged.
    pub fn discard(&self) {
        self.staged.write().expect("lock poisoned").clear();
    }
}

impl ObjectStore for StagingObjectStore {
    fn read(&self, id: &ContentHash) -> StoreResult<Option<StoredObject>> {
        if let Some(object) = self.staged.read().expect("lock poisoned").get(id) {
            return Ok(Some(object.clone()));
        }
        self.backing.read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ContentHash> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullHash);
        }
        self.staged
            .write()
            .expect("lock poisoned")
            .entry(id)
            .or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ContentHash) -> StoreResult<bool> {
        if self.is_staged(id) {
            return Ok(true);
        }
        self.backing.exists(id)
    }

    fn delete(&self, id: &ContentHash) -> StoreResult<bool> {
        let staged = self.staged.write().expect("lock poisoned").remove(id).is_some();
        Ok(self.backing.delete(id)? || staged)
    }

    fn read_batch(
        &self,
        ids: &[ContentHash],
    ) -> StoreResult<HashMap<ContentHash, Option<StoredObject>>> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        {
            let staged = self.staged.read().expect("lock poisoned");
            for id in ids {
                match staged.get(id) {
                    Some(object) => {
                        found.insert(*id, Some(object.clone()));
                    }
                    None => missing.push(*id),
                }
            }
        }
        if !missing.is_empty() {
            found.extend(self.backing.read_batch(&missing)?);
        }
        Ok(found)
    }
}

impl std::fmt::Debug for StagingObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingObjectStore")
            .field("staged", &self.staged_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::CountingObjectStore;
    use crate::memory::InMemoryObjectStore;
    use crate::object::tests::Note;
    use crate::object::StoredValue;

    fn note(title: &str) -> StoredObject {
        Note::new(title).to_stored_object().unwrap()
    }

    fn setup() -> (Arc<InMemoryObjectStore>, StagingObjectStore) {
        let backing = Arc::new(InMemoryObjectStore::new());
        let staging = StagingObjectStore::new(backing.clone());
        (backing, staging)
    }

    #[test]
    fn writes_stay_staged() {
        let (backing, staging) = setup();
        let id = staging.write(&note("draft")).unwrap();

        assert!(staging.exists(&id).unwrap());
        assert_eq!(staging.read(&id).unwrap(), Some(note("draft")));
        assert!(backing.is_empty());
    }

    #[test]
    fn reads_fall_through_to_backing() {
        let (backing, staging) = setup();
        let kept = backing.write(&note("kept")).unwrap();
        let draft = staging.write(&note("draft")).unwrap();
        let missing = ContentHash::from_bytes(b"missing");

        let found = staging.read_batch(&[kept, draft, missing]).unwrap();
        assert!(found[&kept].is_some());
        assert!(found[&draft].is_some());
        assert!(found[&missing].is_none());
    }

    #[test]
    fn staged_hits_skip_the_backing_store() {
        let backing = Arc::new(CountingObjectStore::new(InMemoryObjectStore::new()));
        let staging = StagingObjectStore::new(backing.clone());
        let id = staging.write(&note("draft")).unwrap();

        staging.read_batch(&[id]).unwrap();
        staging.read(&id).unwrap();
        assert_eq!(backing.reads(), 0);
        assert_eq!(backing.batch_reads(), 0);
    }

    #[test]
    fn publish_moves_only_named_objects() {
        let (backing, staging) = setup();
        let wanted = staging.write(&note("wanted")).unwrap();
        let scratch = staging.write(&note("scratch")).unwrap();

        assert_eq!(staging.publish(&[wanted, ContentHash::from_bytes(b"x")]).unwrap(), 1);
        assert!(backing.exists(&wanted).unwrap());
        assert!(!backing.exists(&scratch).unwrap());
        assert_eq!(staging.staged_len(), 1);

        staging.discard();
        assert!(!staging.exists(&scratch).unwrap());
        assert_eq!(backing.len(), 1);
    }

    #[test]
    fn failed_publish_keeps_objects_staged() {
        let (backing, staging) = setup();
        let id = staging.write(&note("draft")).unwrap();
        backing.set_offline(true);

        assert!(matches!(staging.publish(&[id]), Err(StoreError::Unavailable(_))));
        assert!(staging.is_staged(&id));
    }
}
