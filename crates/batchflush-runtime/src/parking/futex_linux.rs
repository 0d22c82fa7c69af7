//! Linux futex-based loop parking
//!
//! Futex word semantics:
//! - 0 = no notification
//! - 1 = notification pending
//!
//! Park:
//! 1. Mark parked
//! 2. Consume a pending notification if there is one, else FUTEX_WAIT on 0
//! 3. Clear parked, consume any notification that woke us
//!
//! Unpark:
//! 1. Set futex word to 1
//! 2. FUTEX_WAKE only if the loop is marked parked

use super::LoopParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

const EMPTY: u32 = 0;
const NOTIFIED: u32 = 1;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: EMPTY or NOTIFIED
    futex: AtomicU32,

    /// Loop thread is inside `park()`
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(EMPTY),
            parked: AtomicBool::new(false),
        }
    }

    fn futex_wait(&self, timeout: Option<Duration>) -> bool {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Sleeps only while the word is still EMPTY
        let result = unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                EMPTY,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            )
        };
        result == 0
    }

    fn futex_wake(&self) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        self.parked.store(true, Ordering::SeqCst);

        if self.futex.swap(EMPTY, Ordering::SeqCst) == NOTIFIED {
            self.parked.store(false, Ordering::SeqCst);
            return true;
        }

        // EAGAIN here means an unpark raced us; the swap below picks it up
        let _ = self.futex_wait(timeout);

        self.parked.store(false, Ordering::SeqCst);
        self.futex.swap(EMPTY, Ordering::SeqCst) == NOTIFIED
    }

    fn unpark(&self) {
        if self.futex.swap(NOTIFIED, Ordering::SeqCst) == NOTIFIED {
            return; // already pending
        }
        if self.parked.load(Ordering::SeqCst) {
            self.futex_wake();
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
