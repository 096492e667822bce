//! QueueConfig / WorkQueueBuilder - キューの構築
//!
//! # 学習ポイント
//! - Builder パターン
//! - 起動時検証（Fail-fast: 同期しない戦略は安全な `build()` では作れない）
//! - serde の `#[serde(default)]` で部分的な設定を受け付ける

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::WorkQueue;
use crate::error::WorkqError;
use crate::sync::{LockStrategy, SwitchableLock};

pub const DEFAULT_THREAD_NAME: &str = "workq-worker";

/// Queue settings, deserializable from any serde format.
///
/// ```ignore
/// let config: QueueConfig = serde_json::from_str(r#"{ "lock_strategy": "spin" }"#)?;
/// let queue = WorkQueue::from_config(&config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub lock_strategy: LockStrategy,
    /// Name given to the background thread.
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock_strategy: LockStrategy::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Builds a [`WorkQueue`].
///
/// # 使用例
/// ```ignore
/// let queue = WorkQueue::builder()
///     .lock_strategy(LockStrategy::Spin)
///     .thread_name("io-worker")
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkQueueBuilder {
    config: QueueConfig,
}

impl WorkQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.config.lock_strategy = strategy;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the worker thread and return the queue.
    ///
    /// # Errors
    /// - [`WorkqError::UnsynchronizedStrategy`] for `LockStrategy::None`
    /// - [`WorkqError::Spawn`] when the thread cannot be created
    pub fn build(self) -> Result<WorkQueue, WorkqError> {
        let units = SwitchableLock::new(self.config.lock_strategy, VecDeque::new())?;
        WorkQueue::with_lock(units, self.config.thread_name)
    }

    /// Like [`build`](Self::build) but accepts `LockStrategy::None`.
    ///
    /// # Safety
    /// With `LockStrategy::None` the submitting thread and the worker thread touch
    /// the queue without synchronization. The caller must make sure they never
    /// overlap: submit from a single thread, and only once every previously
    /// submitted task has finished (e.g. `wait()` on each handle before the next
    /// `submit`).
    pub unsafe fn build_unchecked(self) -> Result<WorkQueue, WorkqError> {
        // SAFETY: forwarded to the caller
        let units =
            unsafe { SwitchableLock::new_unchecked(self.config.lock_strategy, VecDeque::new()) };
        WorkQueue::with_lock(units, self.config.thread_name)
    }
}
