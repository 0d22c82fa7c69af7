//! `Channel` over any `std::io::Write`
//!
//! Writes are submitted to the home loop as tasks and land in the wrapped
//! writer (typically a `BufWriter` around a socket); `flush()` pushes the
//! writer's buffer down. Because both go through the same FIFO loop, a flush
//! scheduled after a write always sees that write.

use crate::event_loop::LoopHandle;
use batchflush_core::{Channel, FlushResult};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Counter snapshot for a `WriteChannel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Write tasks that reached the writer
    pub writes: u64,
    /// Bytes accepted by the writer
    pub bytes: u64,
    /// Calls to `flush()`
    pub flushes: u64,
    /// Failed writes and flushes
    pub errors: u64,
}

struct ChannelShared<W> {
    /// Only locked on the home loop, so never contended.
    writer: Mutex<W>,
    writes: AtomicU64,
    bytes: AtomicU64,
    flushes: AtomicU64,
    errors: AtomicU64,
}

/// A write-buffered channel bound to one event loop.
pub struct WriteChannel<W> {
    shared: Arc<ChannelShared<W>>,
    event_loop: LoopHandle,
}

impl<W> WriteChannel<W>
where
    W: Write + Send + 'static,
{
    pub fn new(writer: W, event_loop: LoopHandle) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                writer: Mutex::new(writer),
                writes: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                flushes: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
            event_loop,
        }
    }

    /// Queue `data` to be written on the home loop. Does not flush.
    pub fn write(&self, data: impl Into<Vec<u8>>) -> FlushResult<()> {
        let data = data.into();
        let shared = Arc::clone(&self.shared);
        self.event_loop.submit(move || {
            let mut writer = shared.writer.lock().unwrap_or_else(PoisonError::into_inner);
            match writer.write_all(&data) {
                Ok(()) => {
                    shared.writes.fetch_add(1, Ordering::Relaxed);
                    shared.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    shared.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, len = data.len(), "channel write failed");
                }
            }
        })
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            writes: self.shared.writes.load(Ordering::Relaxed),
            bytes: self.shared.bytes.load(Ordering::Relaxed),
            flushes: self.shared.flushes.load(Ordering::Relaxed),
            errors: self.shared.errors.load(Ordering::Relaxed),
        }
    }

    /// Run `f` against the writer. Meant for inspection once the loop is idle.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut writer = self.shared.writer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut writer)
    }
}

impl<W> Channel for WriteChannel<W>
where
    W: Write + Send + 'static,
{
    type Loop = LoopHandle;

    fn flush(&self) {
        self.shared.flushes.fetch_add(1, Ordering::Relaxed);
        let mut writer = self.shared.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.flush() {
            self.shared.errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, loop_id = %self.event_loop.id(), "channel flush failed");
        }
    }

    fn event_loop(&self) -> LoopHandle {
        self.event_loop.clone()
    }
}
