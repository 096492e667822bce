//! Errors - ライブラリ全体のエラー型
//!
//! - `WorkqError`: キュー／ワーカーの構築・破棄で起きるエラー
//! - `TaskError`: 個々のタスクの結果として TaskHandle から返るエラー

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkqError {
    /// バックグラウンドスレッドの生成に失敗（構築そのものが失敗する）
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("lock strategy `none` requires the unchecked (unsafe) constructor")]
    UnsynchronizedStrategy,

    #[error("unknown lock strategy: {0:?} (expected none, spin or blocking)")]
    InvalidStrategy(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
}

/// Failure reported by a [`TaskHandle`](crate::queue::TaskHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The callable panicked on the worker thread.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The unit of work was dropped before it ran (discarded at shutdown).
    #[error("task was discarded before it ran (broken handle)")]
    Broken,
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
