//! Sync primitives: busy-wait lock and the strategy-switchable lock built on it.

mod spin;
mod switchable;

pub use spin::SpinLock;
pub use switchable::{LockStrategy, SwitchGuard, SwitchableLock};
