//! TaskHandle - 投入したタスクの結果を受け取る read-once ハンドル
//!
//! # 学習ポイント
//! - `tokio::sync::oneshot` を promise/future の組として使う
//! - 同期 API (`wait`) と非同期 API (`Future` impl) の両立
//! - sender が drop されたら Broken（破棄されたタスク）

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot::{self, error::TryRecvError};

use super::TaskId;
use crate::error::TaskError;

/// Read-once handle to the outcome of a submitted task.
///
/// The outcome is `Ok(value)`, `Err(TaskError::Panicked)` when the callable
/// panicked, or `Err(TaskError::Broken)` when the task was discarded before it
/// ran. There is no timeout: waiting is unbounded.
///
/// [`wait`](Self::wait) blocks the calling thread. Inside an async runtime,
/// `.await` the handle instead, or move `wait` onto a blocking thread with
/// `tokio::task::spawn_blocking`.
pub struct TaskHandle<R> {
    id: TaskId,
    rx: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<R, TaskError>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block the current thread until the task has run or been discarded.
    ///
    /// # Panics
    /// Panics when called from inside an async runtime; `.await` the handle there.
    pub fn wait(self) -> Result<R, TaskError> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(TaskError::Broken))
    }

    /// Non-blocking check.
    ///
    /// `None` while the task is still queued or running. Once a value has been
    /// taken, later calls report `Broken`.
    pub fn try_take(&mut self) -> Option<Result<R, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(TaskError::Broken)),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(TaskError::Broken)))
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pair<R>() -> (oneshot::Sender<Result<R, TaskError>>, TaskHandle<R>) {
        let (tx, rx) = oneshot::channel();
        (tx, TaskHandle::new(TaskId::new(1), rx))
    }

    #[test]
    fn try_take_is_read_once() {
        let (tx, mut handle) = pair::<u8>();
        assert_eq!(handle.try_take(), None);

        tx.send(Ok(9)).unwrap();
        assert_eq!(handle.try_take(), Some(Ok(9)));
        assert_eq!(handle.try_take(), Some(Err(TaskError::Broken)));
    }

    #[test]
    fn wait_blocks_until_fulfilled() {
        let (tx, handle) = pair::<String>();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(Ok("done".to_string())).unwrap();
        });

        assert_eq!(handle.wait(), Ok("done".to_string()));
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn await_resolves_and_reports_broken() {
        let (tx, handle) = pair::<u32>();
        tx.send(Ok(5)).unwrap();
        assert_eq!(handle.await, Ok(5));

        let (tx, handle) = pair::<u32>();
        drop(tx);
        assert_eq!(handle.await, Err(TaskError::Broken));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn wait_runs_on_a_blocking_thread_inside_runtime() {
        let (tx, handle) = pair::<u32>();
        let waiter = tokio::task::spawn_blocking(move || handle.wait());
        tx.send(Ok(11)).unwrap();
        assert_eq!(waiter.await.unwrap(), Ok(11));
    }
}
