//! workq-core
//!
//! Single-worker task queue built on a reusable background-thread lifecycle controller.
//!
//! # モジュール構成
//! - **sync**: SpinLock（ビジーウェイト）と SwitchableLock（None / Spin / Blocking を構築時に選択）
//! - **worker**: WorkerThread（wait → hook → wait のループ、start / stop / terminate）
//! - **queue**: WorkQueue（submit → TaskHandle、FIFO、shutdown 時の破棄）
//! - **observability**: QueueStats
//! - **error**: WorkqError / TaskError
//!
//! # Example
//! ```no_run
//! use workq_core::{LockStrategy, WorkQueue};
//!
//! let queue = WorkQueue::new(LockStrategy::Blocking)?;
//! let squares: Vec<_> = (0..8).map(|i| queue.submit(move || i * i)).collect();
//! let total: i32 = squares.into_iter().map(|h| h.wait().unwrap()).sum();
//! assert_eq!(total, 140);
//! # Ok::<(), workq_core::WorkqError>(())
//! ```

pub mod error;
pub mod observability;
pub mod queue;
pub mod sync;
pub mod worker;

pub use error::{TaskError, WorkqError};
pub use observability::QueueStats;
pub use queue::{QueueConfig, TaskHandle, TaskId, WorkQueue, WorkQueueBuilder};
pub use sync::{LockStrategy, SpinLock, SwitchableLock};
pub use worker::{HookStatus, LifecycleState, WorkerThread};
