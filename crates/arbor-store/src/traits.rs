use std::collections::HashMap;

use arbor_types::ContentHash;

use crate::error::StoreResult;
use crate::object::StoredObject;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. Content-addressing guarantees this:
///   the same data always produces the same hash.
/// - Writing an object that is already present is a no-op.
/// - Reading a missing key yields `Ok(None)`; only transport failures are
///   errors.
/// - Concurrent reads and concurrent idempotent writes are always safe.
/// - The store never interprets object contents.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content hash.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` on I/O failure.
    fn read(&self, id: &ContentHash) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content hash.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn write(&self, object: &StoredObject) -> StoreResult<ContentHash>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ContentHash) -> StoreResult<bool>;

    /// Delete an object by hash. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deleting a reachable
    /// object corrupts every version that references it.
    fn delete(&self, id: &ContentHash) -> StoreResult<bool>;

    /// Read many objects in one request.
    ///
    /// Every requested hash appears in the result, mapped to `None` when
    /// absent. Default implementation calls `read()` for each hash; networked
    /// backends override it to issue a single round trip.
    fn read_batch(
        &self,
        ids: &[ContentHash],
    ) -> StoreResult<HashMap<ContentHash, Option<StoredObject>>> {
        ids.iter()
            .map(|id| Ok((*id, self.read(id)?)))
            .collect()
    }

    /// Write multiple objects in a batch and return their hashes.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ContentHash>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
