//! Branches: a tree behind single-writer, multi-reader transactions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use arbor_tree::{AppliedOperation, NoRevert, Operation, RevertResolver, Tree};
use arbor_types::IdGenerator;

use crate::error::{BranchError, BranchResult};
use crate::transaction::{ReadTransaction, WriteTransaction};

static NEXT_BRANCH: AtomicU64 = AtomicU64::new(1);

#[derive(Default, Clone, Copy)]
struct Activity {
    reads: usize,
    writing: bool,
}

thread_local! {
    /// Transactions the current thread has open, per branch.
    static ACTIVE: RefCell<HashMap<u64, Activity>> = RefCell::new(HashMap::new());
}

fn activity(branch: u64) -> Activity {
    ACTIVE.with(|active| active.borrow().get(&branch).copied().unwrap_or_default())
}

fn update(branch: u64, f: impl FnOnce(&mut Activity)) {
    ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        let entry = active.entry(branch).or_default();
        f(entry);
        if entry.reads == 0 && !entry.writing {
            active.remove(&branch);
        }
    });
}

struct ReadGuard(u64);

impl ReadGuard {
    fn enter(branch: u64) -> Self {
        update(branch, |a| a.reads += 1);
        Self(branch)
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        update(self.0, |a| a.reads -= 1);
    }
}

struct WriteGuard(u64);

impl WriteGuard {
    fn enter(branch: u64) -> BranchResult<Self> {
        let current = activity(branch);
        if current.reads > 0 {
            return Err(BranchError::Usage(
                "write transaction requested inside a read transaction".into(),
            ));
        }
        if current.writing {
            return Err(BranchError::Usage("nested write transaction".into()));
        }
        update(branch, |a| a.writing = true);
        Ok(Self(branch))
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        update(self.0, |a| a.writing = false);
    }
}

/// A mutable editing session over one tree.
///
/// Any number of read transactions may run at once, each on the tree as it
/// was committed when the transaction started. Write transactions are
/// exclusive and edit a private copy, so a failing write changes nothing.
///
/// On one thread, a write may not start while a read of the same branch is
/// open; reads inside a write see the last committed tree.
pub struct Branch {
    id: u64,
    tree: RwLock<Tree>,
    writer: Mutex<()>,
    ids: Arc<IdGenerator>,
    resolver: Arc<dyn RevertResolver + Send + Sync>,
}

impl Branch {
    pub fn new(tree: Tree, ids: Arc<IdGenerator>) -> Self {
        Self::with_resolver(tree, ids, Arc::new(NoRevert))
    }

    /// A branch that expands revert operations with `resolver`.
    pub fn with_resolver(
        tree: Tree,
        ids: Arc<IdGenerator>,
        resolver: Arc<dyn RevertResolver + Send + Sync>,
    ) -> Self {
        Self {
            id: NEXT_BRANCH.fetch_add(1, Ordering::Relaxed),
            tree: RwLock::new(tree),
            writer: Mutex::new(()),
            ids,
            resolver,
        }
    }

    /// The last committed tree.
    pub fn tree(&self) -> Tree {
        self.tree.read().expect("lock poisoned").clone()
    }

    pub fn id_generator(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    pub fn compute_read<R>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> BranchResult<R>,
    ) -> BranchResult<R> {
        let _guard = ReadGuard::enter(self.id);
        let transaction = ReadTransaction::new(self.tree());
        f(&transaction)
    }

    pub fn run_read(&self, f: impl FnOnce(&ReadTransaction) -> BranchResult<()>) -> BranchResult<()> {
        self.compute_read(f)
    }

    pub fn compute_write<R>(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<R>,
    ) -> BranchResult<R> {
        self.write_with(f, |_| {})
    }

    pub fn run_write(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<()>,
    ) -> BranchResult<()> {
        self.compute_write(f)
    }

    /// Run a write transaction and hand the applied operations to
    /// `on_commit` while the writer lock is still held.
    pub(crate) fn write_with<R>(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<R>,
        on_commit: impl FnOnce(&[AppliedOperation]),
    ) -> BranchResult<R> {
        let _guard = WriteGuard::enter(self.id)?;
        let _writer = self.writer.lock().expect("lock poisoned");

        let mut transaction =
            WriteTransaction::new(self.tree(), Arc::clone(&self.ids), Arc::clone(&self.resolver));
        let result = f(&mut transaction)?;
        let (tree, applied) = transaction.finish();
        debug!(branch = self.id, operations = applied.len(), "committed write transaction");
        *self.tree.write().expect("lock poisoned") = tree;
        on_commit(&applied);
        Ok(result)
    }

    /// Replace the committed tree, e.g. after the branch head moved.
    pub fn reset(&self, tree: Tree) {
        let _writer = self.writer.lock().expect("lock poisoned");
        *self.tree.write().expect("lock poisoned") = tree;
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer.lock().expect("lock poisoned")
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("id", &self.id)
            .field("tree", &*self.tree.read().expect("lock poisoned"))
            .finish()
    }
}

/// A branch that records every operation its write transactions commit.
///
/// [`operations_and_tree`](Self::operations_and_tree) hands the log and the
/// resulting tree to version creation.
#[derive(Debug)]
pub struct OtBranch {
    branch: Branch,
    log: Mutex<Vec<Operation>>,
}

impl OtBranch {
    pub fn new(branch: Branch) -> Self {
        Self {
            branch,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    pub fn compute_read<R>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> BranchResult<R>,
    ) -> BranchResult<R> {
        self.branch.compute_read(f)
    }

    pub fn compute_write<R>(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<R>,
    ) -> BranchResult<R> {
        self.branch.write_with(f, |applied| {
            self.log
                .lock()
                .expect("lock poisoned")
                .extend(applied.iter().map(|a| a.operation.clone()));
        })
    }

    pub fn run_write(
        &self,
        f: impl FnOnce(&mut WriteTransaction) -> BranchResult<()>,
    ) -> BranchResult<()> {
        self.compute_write(f)
    }

    /// Operations recorded since the last call, and the current tree.
    pub fn operations_and_tree(&self) -> (Vec<Operation>, Tree) {
        let _writer = self.branch.lock_writer();
        let operations = std::mem::take(&mut *self.log.lock().expect("lock poisoned"));
        (operations, self.branch.tree())
    }
}
