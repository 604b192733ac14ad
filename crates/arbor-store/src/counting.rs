use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use arbor_types::ContentHash;

use crate::error::StoreResult;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Store wrapper that counts the calls made against an inner store.
///
/// Useful to assert how many round trips a query really issued.
#[derive(Debug, Default)]
pub struct CountingObjectStore<S> {
    inner: S,
    reads: AtomicUsize,
    batch_reads: AtomicUsize,
    batch_keys: AtomicUsize,
    writes: AtomicUsize,
}

impl<S: ObjectStore> CountingObjectStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            batch_reads: AtomicUsize::new(0),
            batch_keys: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Single-key reads issued.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Batch reads issued.
    pub fn batch_reads(&self) -> usize {
        self.batch_reads.load(Ordering::SeqCst)
    }

    /// Total keys requested across all batch reads.
    pub fn batch_keys(&self) -> usize {
        self.batch_keys.load(Ordering::SeqCst)
    }

    /// Writes issued (including no-op rewrites).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.batch_reads.store(0, Ordering::SeqCst);
        self.batch_keys.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ObjectStore> ObjectStore for CountingObjectStore<S> {
    fn read(&self, id: &ContentHash) -> StoreResult<Option<StoredObject>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ContentHash> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(object)
    }

    fn exists(&self, id: &ContentHash) -> StoreResult<bool> {
        self.inner.exists(id)
    }

    fn delete(&self, id: &ContentHash) -> StoreResult<bool> {
        self.inner.delete(id)
    }

    fn read_batch(
        &self,
        ids: &[ContentHash],
    ) -> StoreResult<HashMap<ContentHash, Option<StoredObject>>> {
        self.batch_reads.fetch_add(1, Ordering::SeqCst);
        self.batch_keys.fetch_add(ids.len(), Ordering::SeqCst);
        self.inner.read_batch(ids)
    }
}
