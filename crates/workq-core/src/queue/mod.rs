//! WorkQueue - 単一ワーカーの FIFO タスクキュー
//!
//! # フロー
//! 1. `submit()` で callable を UnitOfWork に包み、TaskHandle を即座に返す
//! 2. SwitchableLock の下で queue に push し、WorkerThread を `start()` する
//! 3. ワーカーは 1 サイクルにつき 1 件だけ pop し、lock を外してから実行する
//! 4. shutdown / drop: 未実行のタスクは実行せずに破棄（handle は Broken）、その後 join

mod config;
mod handle;
mod unit;

pub use config::{DEFAULT_THREAD_NAME, QueueConfig, WorkQueueBuilder};
pub use handle::TaskHandle;
pub use unit::TaskId;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, trace};

use self::unit::UnitOfWork;
use crate::error::WorkqError;
use crate::observability::{Counters, QueueStats};
use crate::sync::{LockStrategy, SwitchableLock};
use crate::worker::{HookStatus, LifecycleState, WorkerThread};

/// State shared with the hook running on the worker thread.
struct Shared {
    units: SwitchableLock<VecDeque<UnitOfWork>>,
    counters: Counters,
}

impl Shared {
    /// One hook cycle: dequeue at most one unit and run it outside the lock.
    fn run_next(&self) -> HookStatus {
        let (unit, more) = {
            let mut units = self.units.lock();
            match units.pop_front() {
                Some(unit) => (unit, !units.is_empty()),
                None => return HookStatus::Idle,
            }
        };

        trace!(task = %unit.id(), "task started");
        unit.run(&self.counters);

        if more { HookStatus::Pending } else { HookStatus::Idle }
    }
}

/// FIFO task queue drained by one dedicated background thread.
///
/// Any number of threads may [`submit`](Self::submit) concurrently; tasks run
/// serially, in submission order, on the worker thread.
pub struct WorkQueue {
    shared: Arc<Shared>,
    worker: WorkerThread,
    next_id: AtomicU64,
    closed: bool,
}

impl WorkQueue {
    /// Queue with a synchronizing lock strategy and default settings.
    pub fn new(strategy: LockStrategy) -> Result<Self, WorkqError> {
        Self::builder().lock_strategy(strategy).build()
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, WorkqError> {
        Self::builder().config(config.clone()).build()
    }

    pub fn builder() -> WorkQueueBuilder {
        WorkQueueBuilder::new()
    }

    pub(crate) fn with_lock(
        units: SwitchableLock<VecDeque<UnitOfWork>>,
        thread_name: String,
    ) -> Result<Self, WorkqError> {
        let strategy = units.strategy();
        let shared = Arc::new(Shared {
            units,
            counters: Counters::default(),
        });

        let worker = WorkerThread::spawn(thread_name, {
            let shared = Arc::clone(&shared);
            move || shared.run_next()
        })?;
        debug!(worker = %worker.name(), %strategy, "work queue created");

        Ok(Self {
            shared,
            worker,
            next_id: AtomicU64::new(1),
            closed: false,
        })
    }

    /// Enqueue `f` and wake the worker. Never blocks beyond the enqueue itself.
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (unit, handle) = UnitOfWork::bind(id, f);

        self.shared.counters.record_submitted();
        self.shared.units.lock().push_back(unit);
        trace!(task = %id, "task submitted");

        self.worker.start();
        handle
    }

    /// Bind `f` to `args` and submit the result.
    ///
    /// ```ignore
    /// let fib = queue.submit_with(fibonacci, 20);
    /// let sum = queue.submit_with(|(a, b)| a + b, (1, 2));
    /// ```
    pub fn submit_with<A, F, R>(&self, f: F, args: A) -> TaskHandle<R>
    where
        A: Send + 'static,
        F: FnOnce(A) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.submit(move || f(args))
    }

    /// Suppress further wakes of the worker.
    ///
    /// Queued tasks stay queued and run after the next `submit` wakes the worker.
    pub fn stop_wakes(&self) {
        self.worker.stop();
    }

    /// Number of tasks waiting to be dequeued.
    pub fn pending(&self) -> usize {
        self.shared.units.lock().len()
    }

    pub fn strategy(&self) -> LockStrategy {
        self.shared.units.strategy()
    }

    pub fn thread_name(&self) -> &str {
        self.worker.name()
    }

    pub fn worker_state(&self) -> LifecycleState {
        self.worker.state()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared
            .counters
            .snapshot(self.strategy(), self.worker_state(), self.pending())
    }

    /// Discard pending tasks, then stop and join the worker.
    ///
    /// Returns how many tasks were discarded. Their handles report
    /// [`TaskError::Broken`](crate::TaskError::Broken). A task already running
    /// is allowed to finish; this call waits for it.
    pub fn shutdown(mut self) -> Result<usize, WorkqError> {
        self.close()
    }

    fn close(&mut self) -> Result<usize, WorkqError> {
        if self.closed {
            return Ok(0);
        }
        self.closed = true;

        // lock を持ったまま join すると、lock 待ちの hook とデッドロックする
        let discarded: Vec<UnitOfWork> = self.shared.units.lock().drain(..).collect();
        let count = discarded.len();
        if count > 0 {
            debug!(worker = %self.worker.name(), count, "discarding queued tasks");
        }
        self.shared.counters.record_discarded(count);
        drop(discarded);

        self.worker.terminate()?;
        Ok(count)
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(worker = %self.worker.name(), error = %e, "work queue shutdown failed");
        }
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("thread_name", &self.worker.name())
            .field("strategy", &self.strategy())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
