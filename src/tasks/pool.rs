//! Background Worker Pool
//!
//! Bounded-concurrency executor for detached cache work (refresh-ahead and
//! stale-while-revalidate refreshes). Tasks run independently of the request
//! that scheduled them, failures are logged only, and shutdown waits for
//! in-flight work up to a grace period before aborting the rest.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Handle to a shared pool of background workers. Clones share the pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    closed: AtomicBool,
}

/// Decrements the pending count when a task ends, including on panic or abort.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    /// Creates a pool running at most `concurrency` tasks at once and
    /// holding at most `max_pending` queued plus running tasks.
    pub fn new(concurrency: usize, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                tasks: Mutex::new(JoinSet::new()),
                pending: Arc::new(AtomicUsize::new(0)),
                max_pending: max_pending.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.worker_concurrency, config.worker_max_pending)
    }

    // == Submit ==
    /// Schedules `task` for background execution.
    ///
    /// Returns false, without running it, when the pool is shut down or its
    /// backlog is full. Must be called from within a tokio runtime.
    pub fn submit<F>(&self, name: &str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            warn!(task = %name, "Worker pool shut down, dropping background task");
            return false;
        }
        if inner.pending.fetch_add(1, Ordering::AcqRel) >= inner.max_pending {
            inner.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(task = %name, max_pending = inner.max_pending, "Worker pool backlog full, dropping background task");
            return false;
        }

        let guard = PendingGuard(inner.pending.clone());
        let permits = inner.permits.clone();
        let mut tasks = inner.tasks.lock();
        while let Some(finished) = tasks.try_join_next() {
            log_join_result(finished);
        }
        tasks.spawn(async move {
            let _guard = guard;
            // Closed only on shutdown; the task then ends without running
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        debug!(task = %name, "Background task scheduled");
        true
    }

    /// Number of queued plus running tasks.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // == Shutdown ==
    /// Stops accepting work, waits up to `grace` for in-flight tasks, then
    /// aborts whatever is still running.
    pub async fn shutdown(&self, grace: Duration) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        let outstanding = tasks.len();
        info!(outstanding, "Draining background worker pool");

        let drained = timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = tasks.len(), "Grace period elapsed, aborting background tasks");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        self.inner.permits.close();
        info!("Background worker pool stopped");
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Background task panicked");
        }
    }
}
