//! Condvar-based loop parking
//!
//! Used on platforms without futex support.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct CondvarParking {
    /// Notification pending
    notified: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            notified: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for CondvarParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
        if !*guard {
            self.parked.store(true, Ordering::Relaxed);
            guard = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout(guard, t)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
            };
            self.parked.store(false, Ordering::Relaxed);
        }
        std::mem::replace(&mut *guard, false)
    }

    fn unpark(&self) {
        {
            let mut guard = self.notified.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = true;
        }
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
