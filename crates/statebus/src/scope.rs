//! Execution scope for a store's tasks.
//!
//! Every task a store starts (its action loop, its fold loop, one task per
//! pipeline invocation) is spawned into a [`StoreScope`]. Cancelling the scope
//! aborts all of them at their next suspension point; nothing they already
//! folded is rolled back.
//!
//! A scope is explicit: pass one to
//! [`StoreBuilder::with_scope`](crate::StoreBuilder::with_scope), or let the
//! builder call [`StoreScope::current`] to bind a fresh one to the ambient
//! tokio runtime. Stores that share a scope share a lifetime: destroying any
//! of them cancels the tasks of all of them.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{error, trace};

use crate::error::{panic_message, StoreError};

struct ScopeInner {
    handle: Handle,
    tasks: Mutex<JoinSet<()>>,
    cancelled: AtomicBool,
}

/// A cancellable group of tasks running on one tokio runtime.
#[derive(Clone)]
pub struct StoreScope {
    inner: Arc<ScopeInner>,
}

impl StoreScope {
    /// Create a scope whose tasks run on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                handle,
                tasks: Mutex::new(JoinSet::new()),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Create a scope on the runtime this thread is running in.
    ///
    /// Returns [`StoreError::NoRuntime`] outside a tokio runtime.
    pub fn current() -> Result<Self, StoreError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| StoreError::NoRuntime)
    }

    /// Spawn a task bound to this scope.
    ///
    /// Returns `None` without spawning once the scope is cancelled.
    pub fn spawn<F>(&self, future: F) -> Option<AbortHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        if self.inner.cancelled.load(Ordering::Acquire) {
            trace!("scope cancelled, refusing to spawn");
            return None;
        }
        reap(&mut tasks);
        Some(tasks.spawn_on(future, &self.inner.handle))
    }

    /// Abort every task bound to this scope. Idempotent.
    pub fn cancel(&self) {
        let mut tasks = self.lock();
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tasks.abort_all();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Number of tasks that have not finished yet.
    ///
    /// Aborted tasks count until the runtime has dropped them.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.lock();
        reap(&mut tasks);
        tasks.len()
    }

    /// The runtime this scope spawns onto.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        // A panic while holding the lock cannot leave the JoinSet half-updated
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drop finished tasks so the set does not grow with every invocation.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                let message = panic_message(&e.into_panic());
                error!(panic = %message, "store task panicked");
            }
        }
    }
}

impl std::fmt::Debug for StoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreScope")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
