use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{QueryError, QueryResult};
use crate::query::BulkQuery;

type Listener<T> = Box<dyn FnOnce(T)>;

enum SlotState<T> {
    Pending(Vec<Listener<T>>),
    Done(T),
}

/// Write-once cell shared between a [`Value`] and whoever resolves it.
pub(crate) struct Slot<T> {
    state: RefCell<SlotState<T>>,
}

impl<T: Clone + 'static> Slot<T> {
    pub(crate) fn pending() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(SlotState::Pending(Vec::new())),
        })
    }

    pub(crate) fn done(value: T) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(SlotState::Done(value)),
        })
    }

    /// Resolve the slot and run its listeners. A second completion is ignored.
    pub(crate) fn complete(&self, value: T) {
        if matches!(&*self.state.borrow(), SlotState::Done(_)) {
            return;
        }
        let previous = std::mem::replace(
            &mut *self.state.borrow_mut(),
            SlotState::Done(value.clone()),
        );
        if let SlotState::Pending(listeners) = previous {
            for listener in listeners {
                listener(value.clone());
            }
        }
    }

    /// Run `listener` once the slot is resolved (immediately if it already is).
    pub(crate) fn when_done(&self, listener: Listener<T>) {
        let ready = match &mut *self.state.borrow_mut() {
            SlotState::Pending(listeners) => {
                listeners.push(listener);
                return;
            }
            SlotState::Done(value) => value.clone(),
        };
        listener(ready);
    }

    fn get(&self) -> Option<T> {
        match &*self.state.borrow() {
            SlotState::Done(value) => Some(value.clone()),
            SlotState::Pending(_) => None,
        }
    }
}

/// A deferred result of a [`BulkQuery`].
///
/// Transformations chain continuations onto the value; none of them run
/// until the query is executed and the value's inputs have been fetched.
pub struct Value<T> {
    query: BulkQuery,
    slot: Rc<Slot<T>>,
}

impl<T: Clone + 'static> Value<T> {
    pub(crate) fn from_slot(query: &BulkQuery, slot: Rc<Slot<T>>) -> Self {
        Self {
            query: query.clone(),
            slot,
        }
    }

    pub(crate) fn slot(&self) -> &Rc<Slot<T>> {
        &self.slot
    }

    /// The query this value belongs to.
    pub fn query(&self) -> &BulkQuery {
        &self.query
    }

    /// Whether the value is already known without further I/O.
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Transform the value once it is known.
    pub fn map<R: Clone + 'static>(&self, f: impl FnOnce(T) -> R + 'static) -> Value<R> {
        let out = Slot::pending();
        let target = Rc::clone(&out);
        self.slot
            .when_done(Box::new(move |value| target.complete(f(value))));
        Value::from_slot(&self.query, out)
    }

    /// Transform the value, aborting the whole query if `f` fails.
    pub fn try_map<R, E>(&self, f: impl FnOnce(T) -> Result<R, E> + 'static) -> Value<R>
    where
        R: Clone + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let out = Slot::pending();
        let target = Rc::clone(&out);
        let query = self.query.clone();
        self.slot.when_done(Box::new(move |value| match f(value) {
            Ok(result) => target.complete(result),
            Err(e) => query.fail(QueryError::Aborted(Box::new(e))),
        }));
        Value::from_slot(&self.query, out)
    }

    /// Continue with a further query step that depends on this value.
    pub fn map_bulk<R: Clone + 'static>(
        &self,
        f: impl FnOnce(T) -> Value<R> + 'static,
    ) -> Value<R> {
        let out = Slot::pending();
        let target = Rc::clone(&out);
        self.slot.when_done(Box::new(move |value| {
            let next = f(value);
            next.slot
                .when_done(Box::new(move |result| target.complete(result)));
        }));
        Value::from_slot(&self.query, out)
    }

    /// Register a side effect to run when the value becomes known.
    pub fn on_success(&self, handler: impl FnOnce(T) + 'static) -> &Self {
        self.slot.when_done(Box::new(handler));
        self
    }

    /// Run the query until this value is known.
    pub fn execute(&self) -> QueryResult<T> {
        self.query.run()?;
        self.slot.get().ok_or(QueryError::Unresolved)
    }
}

impl<T> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved = matches!(&*self.slot.state.borrow(), SlotState::Done(_));
        f.debug_struct("Value").field("resolved", &resolved).finish()
    }
}
