//! Unit of work: a bound callable plus the promise side of its handle.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{trace, warn};

use super::TaskHandle;
use crate::error::{TaskError, panic_message};
use crate::observability::Counters;

/// Identifier assigned to each submission, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

type Job = Box<dyn FnOnce(&Counters) + Send>;

/// Opaque zero-argument computation owning the promise of one [`TaskHandle`].
///
/// Dropping it without calling [`run`](Self::run) drops the promise, which
/// leaves the handle broken.
pub(crate) struct UnitOfWork {
    id: TaskId,
    job: Job,
}

impl UnitOfWork {
    /// Bind `f` and create the paired handle.
    pub(crate) fn bind<F, R>(id: TaskId, f: F) -> (Self, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |counters: &Counters| {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| TaskError::Panicked(panic_message(payload.as_ref())));

            match &result {
                Ok(_) => counters.record_completed(),
                Err(e) => {
                    warn!(task = %id, error = %e, "task failed");
                    counters.record_panicked();
                }
            }

            // handle が先に drop されていても（結果不要）エラーにはしない
            if tx.send(result).is_err() {
                trace!(task = %id, "result handle already dropped");
            }
        });

        (Self { id, job }, TaskHandle::new(id, rx))
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    /// Execute on the calling thread and fulfil the handle.
    pub(crate) fn run(self, counters: &Counters) {
        (self.job)(counters)
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork").field("id", &self.id).finish_non_exhaustive()
    }
}
