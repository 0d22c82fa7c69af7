//! Loop thread parking
//!
//! An event loop has exactly one consumer thread, so parking is a
//! single-waiter notification: submitters call `unpark()` after pushing a
//! task, the loop calls `park()` when its queue is empty.
//!
//! An `unpark()` that lands before the loop parks is remembered, so the
//! next `park()` returns immediately instead of sleeping on queued work.

use std::time::Duration;

/// Platform-specific parking for a single loop thread
pub trait LoopParking: Send + Sync {
    /// Park the loop thread until unparked or timeout
    ///
    /// Returns:
    /// - `true` if a notification was consumed
    /// - `false` on timeout or spurious wakeup
    ///
    /// The loop re-checks its queue after returning either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Notify the loop thread. Never blocks.
    fn unpark(&self);

    /// Whether the loop thread is currently parked (hint, may be stale)
    fn is_parked(&self) -> bool;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::CondvarParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}
