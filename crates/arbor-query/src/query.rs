use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use arbor_store::{HashRef, ObjectCache, StoredObject, StoredValue};
use arbor_types::ContentHash;

use crate::error::{QueryError, QueryResult};
use crate::value::{Slot, Value};

/// Upper bound on keys sent in a single batch read.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

type Delivery = Box<dyn FnOnce(&ObjectCache, Option<&StoredObject>) -> QueryResult<()>>;

struct Request {
    hash: ContentHash,
    deliver: Delivery,
}

#[derive(Default)]
struct QueryState {
    pending: Vec<Request>,
    waves: usize,
    failure: Option<QueryError>,
}

struct QueryInner {
    cache: Arc<ObjectCache>,
    batch_size: usize,
    state: RefCell<QueryState>,
}

/// Collects hash lookups and resolves them in batched waves.
///
/// A `BulkQuery` is cheap to clone; clones share the same pending set.
/// It is single-threaded: build the graph, call [`Value::execute`], and
/// drop it.
#[derive(Clone)]
pub struct BulkQuery {
    inner: Rc<QueryInner>,
}

impl BulkQuery {
    pub fn new(cache: Arc<ObjectCache>) -> Self {
        Self::with_batch_size(cache, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(cache: Arc<ObjectCache>, batch_size: usize) -> Self {
        Self {
            inner: Rc::new(QueryInner {
                cache,
                batch_size: batch_size.max(1),
                state: RefCell::new(QueryState::default()),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.inner.cache
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    /// Number of waves executed so far.
    pub fn waves(&self) -> usize {
        self.inner.state.borrow().waves
    }

    /// Number of lookups waiting for the next wave.
    pub fn pending_count(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// An already-known value.
    pub fn constant<T: Clone + 'static>(&self, value: T) -> Value<T> {
        Value::from_slot(self, Slot::done(value))
    }

    /// Look up a stored value, yielding `None` when the store lacks it.
    ///
    /// Values already decoded in this session resolve without I/O.
    pub fn get<T: StoredValue>(&self, reference: HashRef<T>) -> Value<Option<Arc<T>>> {
        let hash = reference.hash();
        if let Some(value) = self.inner.cache.cached::<T>(&hash) {
            return self.constant(Some(value));
        }
        let slot = Slot::pending();
        let target = Rc::clone(&slot);
        self.enqueue(Request {
            hash,
            deliver: Box::new(move |cache, object| {
                let value = match object {
                    Some(object) => Some(cache.decode::<T>(&hash, object)?),
                    None => None,
                };
                target.complete(value);
                Ok(())
            }),
        });
        Value::from_slot(self, slot)
    }

    /// Look up a stored value that must exist.
    pub fn get_required<T: StoredValue>(&self, reference: HashRef<T>) -> Value<Arc<T>> {
        let hash = reference.hash();
        if let Some(value) = self.inner.cache.cached::<T>(&hash) {
            return self.constant(value);
        }
        let slot = Slot::pending();
        let target = Rc::clone(&slot);
        self.enqueue(Request {
            hash,
            deliver: Box::new(move |cache, object| {
                let object = object.ok_or(QueryError::NotFound(hash))?;
                target.complete(cache.decode::<T>(&hash, object)?);
                Ok(())
            }),
        });
        Value::from_slot(self, slot)
    }

    /// Apply a query step to every input and collect the results in order.
    pub fn map<I, O, F>(&self, inputs: impl IntoIterator<Item = I>, mut f: F) -> Value<Vec<O>>
    where
        O: Clone + 'static,
        F: FnMut(I) -> Value<O>,
    {
        let parts: Vec<Value<O>> = inputs.into_iter().map(&mut f).collect();
        self.join(parts)
    }

    /// Wait for every value and collect the results in order.
    pub fn join<O: Clone + 'static>(&self, parts: Vec<Value<O>>) -> Value<Vec<O>> {
        if parts.is_empty() {
            return self.constant(Vec::new());
        }
        let out = Slot::pending();
        let results: Rc<RefCell<Vec<Option<O>>>> = Rc::new(RefCell::new(vec![None; parts.len()]));
        let remaining = Rc::new(RefCell::new(parts.len()));
        for (index, part) in parts.iter().enumerate() {
            let results = Rc::clone(&results);
            let remaining = Rc::clone(&remaining);
            let target = Rc::clone(&out);
            part.slot().when_done(Box::new(move |value| {
                results.borrow_mut()[index] = Some(value);
                let left = {
                    let mut left = remaining.borrow_mut();
                    *left -= 1;
                    *left
                };
                if left == 0 {
                    let collected: Vec<O> = results.borrow_mut().drain(..).flatten().collect();
                    target.complete(collected);
                }
            }));
        }
        Value::from_slot(self, out)
    }

    fn enqueue(&self, request: Request) {
        self.inner.state.borrow_mut().pending.push(request);
    }

    /// Record a failure; the running execution stops at the next check.
    pub(crate) fn fail(&self, error: QueryError) {
        let mut state = self.inner.state.borrow_mut();
        if state.failure.is_none() {
            state.failure = Some(error);
        }
    }

    fn take_failure(&self) -> Option<QueryError> {
        let mut state = self.inner.state.borrow_mut();
        let failure = state.failure.take();
        if failure.is_some() {
            state.pending.clear();
        }
        failure
    }

    /// Drain pending lookups wave by wave until none remain.
    pub(crate) fn run(&self) -> QueryResult<()> {
        loop {
            if let Some(error) = self.take_failure() {
                return Err(error);
            }
            let wave = std::mem::take(&mut self.inner.state.borrow_mut().pending);
            if wave.is_empty() {
                return Ok(());
            }

            let mut seen = HashSet::with_capacity(wave.len());
            let keys: Vec<ContentHash> = wave
                .iter()
                .map(|request| request.hash)
                .filter(|hash| seen.insert(*hash))
                .collect();

            let wave_number = {
                let mut state = self.inner.state.borrow_mut();
                state.waves += 1;
                state.waves
            };
            debug!(
                wave = wave_number,
                requests = wave.len(),
                keys = keys.len(),
                "executing query wave"
            );

            let mut fetched: HashMap<ContentHash, Option<StoredObject>> =
                HashMap::with_capacity(keys.len());
            for chunk in keys.chunks(self.inner.batch_size) {
                let batch = self.inner.cache.store().read_batch(chunk).map_err(|e| {
                    self.inner.state.borrow_mut().pending.clear();
                    QueryError::from(e)
                })?;
                fetched.extend(batch);
            }

            for request in wave {
                let object = fetched.get(&request.hash).and_then(Option::as_ref);
                if let Err(e) = (request.deliver)(&self.inner.cache, object) {
                    self.inner.state.borrow_mut().pending.clear();
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for BulkQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkQuery")
            .field("batch_size", &self.inner.batch_size)
            .field("waves", &self.waves())
            .field("pending", &self.pending_count())
            .finish()
    }
}
