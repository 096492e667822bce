//! WorkerThread - バックグラウンドスレッド 1 本のライフサイクル制御
//!
//! # 学習ポイント
//! - Mutex + Condvar + bool predicate（spurious wakeup 対策で毎回 predicate を再確認）
//! - 継承ではなく合成: hook はクロージャとして渡す
//! - terminate() は join まで待つ blocking 呼び出し
//!
//! # Wake semantics (drain-until-idle)
//! - `start()` raises the wake flag. Calls that land before the worker wakes
//!   coalesce into one wake.
//! - The flag stays raised while the hook reports [`HookStatus::Pending`], so the
//!   hook runs back to back, once per cycle.
//! - When a cycle reports [`HookStatus::Idle`] and no `start()` arrived during it,
//!   the worker lowers the flag itself and parks.
//! - `stop()` lowers the flag explicitly: the worker parks after the current cycle
//!   even if work remains. The next `start()` resumes.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{WorkqError, panic_message};

/// What a hook cycle found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// More work may be waiting; run another cycle unless wakes were stopped.
    Pending,
    /// Nothing left to do.
    Idle,
}

/// Lifecycle of the background thread.
///
/// - Idle: waiting for a wake signal
/// - Active: executing the hook
/// - Terminating: termination requested, thread exits at its next wake check
/// - Terminated: thread has exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Active,
    Terminating,
    Terminated,
}

struct WakeState {
    /// 新しい wake 要求が来ているか
    wake_pending: bool,
    /// false になったらループを抜ける
    keep_running: bool,
    active: bool,
    exited: bool,
    /// start() のたびに進む。Idle 判定と start() の競合検出に使う
    generation: u64,
}

struct Shared {
    state: Mutex<WakeState>,
    wake: Condvar,
}

impl Shared {
    // hook はこの lock の外で動くので poison されても状態は一貫している
    fn lock(&self) -> MutexGuard<'_, WakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> LifecycleState {
        let state = self.lock();
        if state.exited {
            LifecycleState::Terminated
        } else if !state.keep_running {
            LifecycleState::Terminating
        } else if state.active {
            LifecycleState::Active
        } else {
            LifecycleState::Idle
        }
    }
}

/// Owns one background thread that sleeps until signaled and then runs a hook.
///
/// # 使用例
/// ```ignore
/// let mut worker = WorkerThread::spawn("my-worker", || {
///     do_one_thing();
///     HookStatus::Idle
/// })?;
/// worker.start();
/// worker.terminate()?;
/// ```
pub struct WorkerThread {
    name: String,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Launch the background thread. It waits for the first `start()`.
    ///
    /// Thread creation failure is returned as [`WorkqError::Spawn`].
    pub fn spawn<F>(name: impl Into<String>, hook: F) -> Result<Self, WorkqError>
    where
        F: FnMut() -> HookStatus + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(WakeState {
                wake_pending: false,
                keep_running: true,
                active: false,
                exited: false,
                generation: 0,
            }),
            wake: Condvar::new(),
        });

        let handle = thread::Builder::new().name(name.clone()).spawn({
            let shared = Arc::clone(&shared);
            move || run_loop(&shared, hook)
        })?;
        debug!(worker = %name, "worker thread spawned");

        Ok(Self {
            name,
            shared,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal a wake.
    pub fn start(&self) {
        {
            let mut state = self.shared.lock();
            state.wake_pending = true;
            state.generation = state.generation.wrapping_add(1);
        }
        self.shared.wake.notify_one();
    }

    /// Suppress further wakes. Does not interrupt a running hook nor end the thread.
    pub fn stop(&self) {
        self.shared.lock().wake_pending = false;
    }

    /// Ask the loop to exit, wake it, and join it.
    ///
    /// Blocks until the hook in progress (if any) returns. Calling it again after
    /// the thread has been joined does nothing.
    pub fn terminate(&mut self) -> Result<(), WorkqError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!(worker = %self.name, "terminate requested");

        self.shared.lock().keep_running = false;
        self.start();

        // hook の中から自分自身を terminate した場合は join できない
        if handle.thread().id() == thread::current().id() {
            warn!(worker = %self.name, "terminate called from the worker thread; detaching");
            return Ok(());
        }

        handle
            .join()
            .map_err(|payload| WorkqError::WorkerPanicked(panic_message(payload.as_ref())))
    }

    pub fn state(&self) -> LifecycleState {
        if self.handle.is_none() {
            return LifecycleState::Terminated;
        }
        self.shared.lifecycle()
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            error!(worker = %self.name, error = %e, "worker thread did not exit cleanly");
        }
    }
}

/// Marks the thread as exited on every way out of the loop, panics included.
struct ExitMarker<'a>(&'a Shared);

impl Drop for ExitMarker<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.active = false;
        state.exited = true;
    }
}

fn run_loop<F>(shared: &Shared, mut hook: F)
where
    F: FnMut() -> HookStatus,
{
    let _exit = ExitMarker(shared);

    loop {
        let seen = {
            let mut state = shared
                .wake
                .wait_while(shared.lock(), |s| !s.wake_pending)
                .unwrap_or_else(PoisonError::into_inner);

            if !state.keep_running {
                debug!("worker loop exiting");
                return;
            }
            state.active = true;
            state.generation
        };

        let status = hook();

        let mut state = shared.lock();
        state.active = false;
        if status == HookStatus::Idle && state.generation == seen {
            state.wake_pending = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + WAIT;
        while !cond() {
            assert!(std::time::Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn hook_does_not_run_without_a_wake() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut worker = WorkerThread::spawn("test-worker", {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                HookStatus::Idle
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.state(), LifecycleState::Idle);

        worker.terminate().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn idle_hook_runs_once_per_start() {
        let (tx, rx) = mpsc::channel();
        let mut worker = WorkerThread::spawn("test-worker", move || {
            tx.send(()).unwrap();
            HookStatus::Idle
        })
        .unwrap();

        worker.start();
        rx.recv_timeout(WAIT).unwrap();
        wait_for(|| worker.state() == LifecycleState::Idle);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        worker.start();
        rx.recv_timeout(WAIT).unwrap();

        worker.terminate().unwrap();
    }

    #[test]
    fn pending_hook_keeps_cycling_until_idle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut worker = WorkerThread::spawn("test-worker", {
            let calls = Arc::clone(&calls);
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 5 { HookStatus::Pending } else { HookStatus::Idle }
            }
        })
        .unwrap();

        worker.start();
        wait_for(|| calls.load(Ordering::SeqCst) == 5);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        worker.terminate().unwrap();
    }

    #[test]
    fn starts_during_a_cycle_coalesce_into_one_more_cycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let mut worker = WorkerThread::spawn("test-worker", {
            let calls = Arc::clone(&calls);
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                }
                HookStatus::Idle
            }
        })
        .unwrap();

        worker.start();
        started_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(worker.state(), LifecycleState::Active);
        for _ in 0..5 {
            worker.start();
        }
        release_tx.send(()).unwrap();

        wait_for(|| calls.load(Ordering::SeqCst) == 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        worker.terminate().unwrap();
    }

    #[test]
    fn stop_parks_the_worker_even_with_pending_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let mut worker = WorkerThread::spawn("test-worker", {
            let calls = Arc::clone(&calls);
            move || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    return HookStatus::Pending;
                }
                HookStatus::Idle
            }
        })
        .unwrap();

        worker.start();
        started_rx.recv_timeout(WAIT).unwrap();
        worker.stop();
        release_tx.send(()).unwrap();

        wait_for(|| worker.state() == LifecycleState::Idle);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        worker.start();
        wait_for(|| calls.load(Ordering::SeqCst) == 2);

        worker.terminate().unwrap();
    }

    #[test]
    fn terminate_joins_and_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut worker = WorkerThread::spawn("test-worker", {
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                HookStatus::Pending
            }
        })
        .unwrap();

        worker.terminate().unwrap();
        assert_eq!(worker.state(), LifecycleState::Terminated);
        // terminate の start() で hook が走ってはいけない
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        worker.terminate().unwrap();
        worker.start();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn terminate_waits_for_running_hook() {
        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicUsize::new(0));

        let mut worker = WorkerThread::spawn("test-worker", {
            let finished = Arc::clone(&finished);
            move || {
                let _ = started_tx.send(());
                thread::sleep(Duration::from_millis(200));
                finished.fetch_add(1, Ordering::SeqCst);
                HookStatus::Pending
            }
        })
        .unwrap();

        worker.start();
        started_rx.recv_timeout(WAIT).unwrap();
        worker.terminate().unwrap();

        // 実行中の hook は完了し、その後は一度も呼ばれない
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn state_is_terminating_while_join_waits_for_the_hook() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let mut worker = WorkerThread::spawn("test-worker", move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            HookStatus::Pending
        })
        .unwrap();

        worker.start();
        started_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(worker.state(), LifecycleState::Active);

        // terminate() は hook が返るまで join でブロックする
        let shared = Arc::clone(&worker.shared);
        let terminator = thread::spawn(move || worker.terminate());
        wait_for(|| shared.lifecycle() == LifecycleState::Terminating);

        release_tx.send(()).unwrap();
        terminator.join().unwrap().unwrap();
        assert_eq!(shared.lifecycle(), LifecycleState::Terminated);
    }

    #[test]
    fn hook_panic_surfaces_on_terminate() {
        let mut worker =
            WorkerThread::spawn("test-worker", || -> HookStatus { panic!("hook exploded") })
                .unwrap();

        worker.start();
        wait_for(|| worker.state() == LifecycleState::Terminated);

        let err = worker.terminate().unwrap_err();
        assert!(matches!(err, WorkqError::WorkerPanicked(msg) if msg.contains("hook exploded")));
    }

    #[test]
    fn thread_carries_the_given_name() {
        let (tx, rx) = mpsc::channel();
        let mut worker = WorkerThread::spawn("named-worker", move || {
            tx.send(thread::current().name().map(str::to_owned)).unwrap();
            HookStatus::Idle
        })
        .unwrap();

        worker.start();
        assert_eq!(rx.recv_timeout(WAIT).unwrap().as_deref(), Some("named-worker"));
        assert_eq!(worker.name(), "named-worker");
        worker.terminate().unwrap();
    }
}
