//! Single-thread FIFO event loop
//!
//! A `LoopThread` owns one OS thread that runs submitted tasks strictly in
//! submission order. Any thread may submit through a `LoopHandle`; the
//! queue is a lock-free MPSC (`SegQueue`), and the loop parks when idle.
//!
//! ```text
//!  submitters ── execute() ──► SegQueue<Task> ──► loop thread
//!                  │                               │  pop, run, pop, run...
//!                  └────────── unpark() ─────────► park() when empty
//! ```

use crate::config::LoopConfig;
use crate::parking::{new_parking, LoopParking};
use crate::tls;
use batchflush_core::{EventLoop, FlushError, FlushResult, Task};
use crossbeam_queue::SegQueue;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Unique identifier for an event loop
///
/// Zero is reserved as the "no loop" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LoopId(u64);

impl LoopId {
    /// Sentinel value indicating no loop
    pub const NONE: LoopId = LoopId(0);

    #[inline]
    pub const fn from_u64(id: u64) -> Self {
        LoopId(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        LoopId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "LoopId(NONE)")
        } else {
            write!(f, "LoopId({})", self.0)
        }
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loop-{}", self.0)
    }
}

/// State shared between the loop thread and its handles.
struct LoopShared {
    id: LoopId,
    queue: SegQueue<Task>,
    parking: Box<dyn LoopParking>,
    shutdown: AtomicBool,
    /// Foreign submitters between their shutdown check and their push
    in_flight: AtomicUsize,
}

/// Cloneable submission handle to a `LoopThread`.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    #[inline]
    pub fn id(&self) -> LoopId {
        self.shared.id
    }

    /// Whether the loop has stopped accepting tasks.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Submit a closure; shorthand for `execute(Box::new(f))`.
    pub fn submit<F>(&self, f: F) -> FlushResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Box::new(f))
    }
}

impl EventLoop for LoopHandle {
    #[inline]
    fn in_event_loop(&self) -> bool {
        tls::current_loop_id() == Some(self.shared.id)
    }

    fn execute(&self, task: Task) -> FlushResult<()> {
        let shared = &self.shared;
        // Announce before the shutdown check: the loop may not exit while a
        // submitter that saw the flag clear has yet to push.
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        // Tasks still draining after shutdown may queue follow-up work.
        if self.is_shutdown() && !self.in_event_loop() {
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(FlushError::LoopShutdown);
        }
        shared.queue.push(task);
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        shared.parking.unpark();
        Ok(())
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("id", &self.shared.id)
            .field("queued", &self.shared.queue.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// An event loop running on a dedicated OS thread.
///
/// Dropping the `LoopThread` shuts the loop down: submissions from other
/// threads are rejected, already-queued tasks still run (and may queue
/// more from the loop thread), then the thread is joined.
pub struct LoopThread {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl LoopThread {
    /// Start a loop thread.
    pub fn spawn(config: LoopConfig) -> FlushResult<Self> {
        config.validate()?;

        let shared = Arc::new(LoopShared {
            id: LoopId::next(),
            queue: SegQueue::new(),
            parking: new_parking(),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        });
        let worker = Arc::clone(&shared);

        let thread = thread::Builder::new()
            .name(format!("{}-{}", config.name, shared.id.as_u64()))
            .spawn(move || run_loop(worker, config))?;

        Ok(Self {
            handle: LoopHandle { shared },
            thread: Some(thread),
        })
    }

    /// A new submission handle.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    #[inline]
    pub fn id(&self) -> LoopId {
        self.handle.id()
    }

    /// Stop accepting tasks, drain the queue and join the loop thread.
    ///
    /// Called from the loop thread itself, this only signals; the thread
    /// exits once the current task returns and the queue is empty.
    pub fn shutdown(&mut self) {
        let shared = &self.handle.shared;
        if !shared.shutdown.swap(true, Ordering::SeqCst) {
            shared.parking.unpark();
        }

        if self.handle.in_event_loop() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(loop_id = %shared.id, "event loop thread panicked");
            }
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The loop body, runs on the dedicated thread.
fn run_loop(shared: Arc<LoopShared>, config: LoopConfig) {
    tls::set_current_loop(shared.id);
    debug!(loop_id = %shared.id, max_batch = config.max_batch, "event loop started");

    loop {
        if run_batch(&shared, config.max_batch) == config.max_batch {
            // Full batch, more may be queued. Give submitters the CPU.
            thread::yield_now();
            continue;
        }
        // Queue observed empty. Read order matters: a submitter pushes
        // before it leaves `in_flight`, so zero in flight and then an
        // empty queue means every accepted task has run.
        if shared.shutdown.load(Ordering::SeqCst)
            && shared.in_flight.load(Ordering::SeqCst) == 0
            && shared.queue.is_empty()
        {
            break;
        }
        shared.parking.park(Some(config.park_timeout));
    }

    tls::clear_current_loop();
    debug!(loop_id = %shared.id, "event loop stopped");
}

/// Run up to `max` queued tasks in FIFO order. Returns how many ran; fewer
/// than `max` means the queue was seen empty.
fn run_batch(shared: &LoopShared, max: usize) -> usize {
    let mut ran = 0;
    while ran < max {
        let Some(task) = shared.queue.pop() else {
            break;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            error!(
                loop_id = %shared.id,
                panic = panic_message(payload.as_ref()),
                "task panicked; loop continues"
            );
        }
        ran += 1;
    }
    ran
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
