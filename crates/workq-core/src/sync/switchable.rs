//! SwitchableLock - 構築時に排他戦略を選ぶロック
//!
//! # 学習ポイント
//! - tagged variant (`RawLock`) による戦略ディスパッチ
//! - RAII guard: acquire = `lock()`, release = guard の drop
//! - `None` 戦略は同期を一切しないので、安全な API からは作れない（`unsafe` 構築のみ）
//!
//! 戦略は構築時に一度だけ決まり、実行中に切り替える API は存在しない。

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::SpinLock;
use crate::error::WorkqError;

/// Mutual exclusion strategy, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// No synchronization at all. The caller guarantees exclusivity.
    None,
    /// Busy-wait on a [`SpinLock`].
    Spin,
    /// Blocking OS mutex.
    #[default]
    #[serde(alias = "mutex")]
    Blocking,
}

impl LockStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            LockStrategy::None => "none",
            LockStrategy::Spin => "spin",
            LockStrategy::Blocking => "blocking",
        }
    }

    /// Does this strategy actually exclude other threads?
    pub fn is_synchronized(self) -> bool {
        !matches!(self, LockStrategy::None)
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockStrategy {
    type Err = WorkqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(LockStrategy::None),
            "spin" => Ok(LockStrategy::Spin),
            "blocking" | "mutex" => Ok(LockStrategy::Blocking),
            _ => Err(WorkqError::InvalidStrategy(s.to_string())),
        }
    }
}

enum RawLock {
    NoOp,
    Spin(SpinLock),
    Blocking(Mutex<()>),
}

/// A lock whose acquire/release dispatch to the strategy chosen at construction.
///
/// Owns the protected value, so access is only possible through a [`SwitchGuard`].
pub struct SwitchableLock<T> {
    raw: RawLock,
    strategy: LockStrategy,
    data: UnsafeCell<T>,
}

// SAFETY: Spin と Blocking は排他を保証する。NoOp は `new_unchecked` の契約で
// 呼び出し側が排他を保証する。
unsafe impl<T: Send> Send for SwitchableLock<T> {}
unsafe impl<T: Send> Sync for SwitchableLock<T> {}

impl<T> SwitchableLock<T> {
    /// Build a lock with a synchronizing strategy.
    ///
    /// `LockStrategy::None` is refused with [`WorkqError::UnsynchronizedStrategy`].
    pub fn new(strategy: LockStrategy, value: T) -> Result<Self, WorkqError> {
        if !strategy.is_synchronized() {
            return Err(WorkqError::UnsynchronizedStrategy);
        }
        // SAFETY: strategy synchronizes
        Ok(unsafe { Self::new_unchecked(strategy, value) })
    }

    /// Build a lock with any strategy, including `None`.
    ///
    /// # Safety
    /// With `LockStrategy::None` the caller must guarantee that no two guards
    /// obtained from this lock are ever alive at the same time.
    pub unsafe fn new_unchecked(strategy: LockStrategy, value: T) -> Self {
        let raw = match strategy {
            LockStrategy::None => RawLock::NoOp,
            LockStrategy::Spin => RawLock::Spin(SpinLock::new()),
            LockStrategy::Blocking => RawLock::Blocking(Mutex::new(())),
        };
        Self {
            raw,
            strategy,
            data: UnsafeCell::new(value),
        }
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// Acquire. The lock is released when the guard is dropped.
    pub fn lock(&self) -> SwitchGuard<'_, T> {
        let release = match &self.raw {
            RawLock::NoOp => Release::NoOp,
            RawLock::Spin(spin) => {
                spin.acquire();
                Release::Spin(spin)
            }
            // 保護対象は `()` なので poison は無視してよい
            RawLock::Blocking(mutex) => {
                Release::Blocking(mutex.lock().unwrap_or_else(PoisonError::into_inner))
            }
        };
        SwitchGuard {
            lock: self,
            release,
            _marker: PhantomData,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for SwitchableLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchableLock")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

enum Release<'a> {
    NoOp,
    Spin(&'a SpinLock),
    #[allow(dead_code)]
    Blocking(MutexGuard<'a, ()>),
}

/// RAII guard returned by [`SwitchableLock::lock`].
///
/// Like `MutexGuard`, the guard is only `Sync` when `T` is, so a shared
/// reference to it cannot hand `&T` of a non-`Sync` value to other threads:
///
/// ```compile_fail
/// use std::cell::Cell;
/// use workq_core::{LockStrategy, SwitchableLock};
///
/// fn assert_sync<S: Sync>(_: &S) {}
///
/// let lock = SwitchableLock::new(LockStrategy::Spin, Cell::new(0_u64)).unwrap();
/// let guard = lock.lock();
/// assert_sync(&guard);
/// ```
pub struct SwitchGuard<'a, T> {
    lock: &'a SwitchableLock<T>,
    release: Release<'a>,
    // 自動 trait を &mut T と同じ条件にする（Sync は T: Sync のときだけ）
    _marker: PhantomData<&'a mut T>,
}

impl<T> Deref for SwitchGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: guard の生存中は排他が成立している
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SwitchGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SwitchGuard<'_, T> {
    fn drop(&mut self) {
        // Blocking は MutexGuard が field の drop で解放される
        if let Release::Spin(spin) = &self.release {
            spin.release();
        }
    }
}
