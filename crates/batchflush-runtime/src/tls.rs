//! Thread-local storage for event loop context
//!
//! Records which loop (if any) the current OS thread is running, so
//! `LoopHandle::in_event_loop` is a single thread-local read.

use crate::event_loop::LoopId;
use std::cell::Cell;

thread_local! {
    /// Id of the loop running on this OS thread, `LoopId::NONE` otherwise
    static CURRENT_LOOP: Cell<u64> = const { Cell::new(LoopId::NONE.as_u64()) };
}

/// Mark the current thread as running `id`. Called once by the loop thread.
#[inline]
pub(crate) fn set_current_loop(id: LoopId) {
    CURRENT_LOOP.with(|cell| cell.set(id.as_u64()));
}

/// Clear the mark when the loop thread exits.
#[inline]
pub(crate) fn clear_current_loop() {
    CURRENT_LOOP.with(|cell| cell.set(LoopId::NONE.as_u64()));
}

/// Id of the loop running on this thread, if any.
#[inline]
pub fn current_loop_id() -> Option<LoopId> {
    let id = LoopId::from_u64(CURRENT_LOOP.with(|cell| cell.get()));
    if id.is_none() {
        None
    } else {
        Some(id)
    }
}
