//! SpinLock - CAS ベースのビジーウェイトロック
//!
//! # 学習ポイント
//! - `compare_exchange_weak` による取得（失敗したら再試行）
//! - Acquire / Release の memory ordering
//! - 公平性なし・待ち時間の上限なし（短いクリティカルセクション専用）

use std::sync::atomic::{AtomicBool, Ordering};

/// Busy-wait mutual exclusion for very short, rarely contended sections.
///
/// `acquire` spins on an atomic compare-and-set from unlocked to locked;
/// `release` unconditionally stores unlocked. There is no owner tracking.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    pub fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // 読み取りだけで回して、キャッシュラインの奪い合いを減らす
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    /// Single attempt, never spins.
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
