//! The flush coordinator
//!
//! One `BatchFlusher` serves one channel and runs its deferred work on that
//! channel's home event loop.
//!
//! State:
//! - `pending` - on-loop requests since the last flush. Only the home loop
//!   touches it, so `Relaxed` loads and stores are enough.
//! - `scheduled` - the one cross-thread bit. `false` = Idle, `true` =
//!   Scheduled. Idle -> Scheduled only by a winning CAS in `request_flush`,
//!   which then submits the wake task; Scheduled -> Idle only when that wake
//!   task starts running. So at most one wake task is ever outstanding.
//!
//! Deferred flushes take two hops through the loop. The wake task is queued
//! behind every write submitted before the request; it re-opens `scheduled`
//! and queues the flush task, which therefore also runs after those writes.

use crate::config::FlusherConfig;
use crate::sync::{AtomicBool, AtomicUsize, Ordering};
use batchflush_core::constants::DEFAULT_MAX_PENDING;
use batchflush_core::{Channel, EventLoop, FlushResult};
use std::fmt;
use std::sync::Arc;
use tracing::{error, trace};

/// Coalesces flush requests for a single channel.
///
/// Cloning is cheap and every clone drives the same coordinator.
pub struct BatchFlusher<C: Channel, L: EventLoop = <C as Channel>::Loop> {
    inner: Arc<Inner<C, L>>,
}

struct Inner<C, L> {
    channel: Arc<C>,
    event_loop: L,
    max_pending: usize,
    pending: AtomicUsize,
    scheduled: AtomicBool,
    /// Runs between the flag read and the CAS, to force contention.
    #[cfg(test)]
    race_hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl<C: Channel> BatchFlusher<C> {
    /// Flusher on the channel's own loop with `max_pending = 64`.
    pub fn new(channel: Arc<C>) -> Self {
        let event_loop = channel.event_loop();
        Self::build(channel, event_loop, DEFAULT_MAX_PENDING)
    }

    /// Flusher on the channel's own loop with a custom threshold.
    pub fn with_max_pending(channel: Arc<C>, max_pending: usize) -> FlushResult<Self> {
        let event_loop = channel.event_loop();
        Self::with_config(channel, event_loop, FlusherConfig::new().max_pending(max_pending))
    }
}

impl<C: Channel, L: EventLoop> BatchFlusher<C, L> {
    /// Flusher on an explicit loop with `max_pending = 64`.
    pub fn with_event_loop(channel: Arc<C>, event_loop: L) -> Self {
        Self::build(channel, event_loop, DEFAULT_MAX_PENDING)
    }

    pub fn with_config(channel: Arc<C>, event_loop: L, config: FlusherConfig) -> FlushResult<Self> {
        config.validate()?;
        Ok(Self::build(channel, event_loop, config.max_pending))
    }

    fn build(channel: Arc<C>, event_loop: L, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                event_loop,
                max_pending,
                pending: AtomicUsize::new(0),
                scheduled: AtomicBool::new(false),
                #[cfg(test)]
                race_hook: None,
            }),
        }
    }

    /// Ask for everything written so far to be flushed soon.
    ///
    /// Callable from any thread; never blocks. On the home loop this may
    /// flush in-line once `max_pending` requests have accumulated. In every
    /// case a deferred flush is guaranteed to follow, either by submitting
    /// a wake task or by riding on the one already outstanding.
    ///
    /// Returns `FlushError::LoopShutdown` if the home loop refused the wake
    /// task. The flag is put back to Idle so later callers see the same
    /// error instead of waiting on a wake that will never run.
    pub fn request_flush(&self) -> FlushResult<()> {
        let inner = &self.inner;

        if inner.event_loop.in_event_loop() {
            let pending = inner.pending.load(Ordering::Relaxed) + 1;
            if pending >= inner.max_pending {
                inner.pending.store(0, Ordering::Relaxed);
                trace!(max_pending = inner.max_pending, "pending threshold reached, flushing in-line");
                inner.channel.flush();
            } else {
                inner.pending.store(pending, Ordering::Relaxed);
            }
        }

        // Cheap read first so a busy Scheduled flag costs no CAS traffic.
        if inner.scheduled.load(Ordering::SeqCst) {
            return Ok(());
        }
        inner.race_point();
        if inner
            .scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let wake = Arc::clone(inner);
        if let Err(e) = inner.event_loop.execute(Box::new(move || wake.wake())) {
            inner.scheduled.store(false, Ordering::SeqCst);
            return Err(e);
        }
        trace!("wake task scheduled");
        Ok(())
    }

    #[cfg(test)]
    fn with_race_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("race hook must be installed before the flusher is shared")
            .race_hook = Some(Box::new(hook));
        self
    }
}

impl<C: Channel, L: EventLoop> Inner<C, L> {
    /// Wake task body. Runs on the home loop.
    fn wake(self: Arc<Self>) {
        // Re-open before queueing the flush: a request landing from here on
        // must schedule its own wake rather than ride on this one.
        self.scheduled.store(false, Ordering::SeqCst);

        let flush = Arc::clone(&self);
        if let Err(e) = self.event_loop.execute(Box::new(move || flush.flush())) {
            error!(error = %e, "home loop rejected the coalesced flush");
        }
    }

    #[cfg(test)]
    fn race_point(&self) {
        if let Some(hook) = &self.race_hook {
            hook();
        }
    }

    #[cfg(not(test))]
    #[inline(always)]
    fn race_point(&self) {}

    /// Flush task body. Runs on the home loop.
    fn flush(&self) {
        self.pending.store(0, Ordering::Relaxed);
        self.channel.flush();
    }
}

impl<C: Channel, L: EventLoop> Clone for BatchFlusher<C, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel, L: EventLoop> fmt::Debug for BatchFlusher<C, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchFlusher")
            .field("max_pending", &self.inner.max_pending)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use batchflush_core::{FlushError, Task};
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool as StdAtomicBool, AtomicUsize as StdAtomicUsize};
    use std::sync::{Barrier, Mutex};
    use std::thread;

    /// Event loop whose queue is drained by hand on the test thread.
    #[derive(Default)]
    struct LoopState {
        in_loop: StdAtomicBool,
        closed: StdAtomicBool,
        queue: Mutex<VecDeque<Task>>,
        submissions: StdAtomicUsize,
    }

    #[derive(Clone, Default)]
    struct ManualLoop(Arc<LoopState>);

    impl ManualLoop {
        fn set_in_loop(&self, in_loop: bool) {
            self.0.in_loop.store(in_loop, Ordering::SeqCst);
        }

        fn close(&self) {
            self.0.closed.store(true, Ordering::SeqCst);
        }

        fn submissions(&self) -> usize {
            self.0.submissions.load(Ordering::SeqCst)
        }

        fn queued(&self) -> usize {
            self.0.queue.lock().unwrap().len()
        }

        fn run_one(&self) -> bool {
            // Pop under the lock, run without it: tasks submit more tasks.
            let task = self.0.queue.lock().unwrap().pop_front();
            match task {
                Some(task) => {
                    task();
                    true
                }
                None => false,
            }
        }

        fn run_all(&self) -> usize {
            let mut n = 0;
            while self.run_one() {
                n += 1;
            }
            n
        }
    }

    impl EventLoop for ManualLoop {
        fn in_event_loop(&self) -> bool {
            self.0.in_loop.load(Ordering::SeqCst)
        }

        fn execute(&self, task: Task) -> FlushResult<()> {
            if self.0.closed.load(Ordering::SeqCst) {
                return Err(FlushError::LoopShutdown);
            }
            self.0.queue.lock().unwrap().push_back(task);
            self.0.submissions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingChannel {
        flushes: StdAtomicUsize,
        event_loop: ManualLoop,
    }

    impl CountingChannel {
        fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl Channel for CountingChannel {
        type Loop = ManualLoop;

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }

        fn event_loop(&self) -> ManualLoop {
            self.event_loop.clone()
        }
    }

    fn setup(max_pending: usize) -> (ManualLoop, Arc<CountingChannel>, BatchFlusher<CountingChannel>) {
        let lp = ManualLoop::default();
        let channel = Arc::new(CountingChannel {
            flushes: StdAtomicUsize::new(0),
            event_loop: lp.clone(),
        });
        let flusher = BatchFlusher::with_max_pending(Arc::clone(&channel), max_pending).unwrap();
        (lp, channel, flusher)
    }

    fn pending(flusher: &BatchFlusher<CountingChannel>) -> usize {
        flusher.inner.pending.load(Ordering::SeqCst)
    }

    fn scheduled(flusher: &BatchFlusher<CountingChannel>) -> bool {
        flusher.inner.scheduled.load(Ordering::SeqCst)
    }

    #[test]
    fn test_flush_outside_event_loop() {
        let lp = ManualLoop::default();
        let channel = Arc::new(CountingChannel {
            flushes: StdAtomicUsize::new(0),
            event_loop: lp.clone(),
        });
        let flusher = BatchFlusher::new(Arc::clone(&channel));
        assert_eq!(flusher.inner.max_pending, 64);

        // First request: one submission, nothing flushed yet
        flusher.request_flush().unwrap();
        assert_eq!(lp.submissions(), 1);
        assert_eq!(channel.flushes(), 0);

        // Second request rides on the outstanding wake
        flusher.request_flush().unwrap();
        assert_eq!(lp.submissions(), 1);
        assert_eq!(channel.flushes(), 0);

        // Wake + flush
        let ran = lp.run_all();
        assert_eq!(ran, 2);
        assert_eq!(channel.flushes(), 1);

        // Re-armed: a new request submits again
        flusher.request_flush().unwrap();
        assert_eq!(lp.submissions(), ran + 1);
        assert_eq!(channel.flushes(), 1);

        lp.run_all();
        assert_eq!(channel.flushes(), 2);
    }

    #[test]
    fn test_flush_in_event_loop() {
        let (lp, channel, flusher) = setup(2);
        lp.set_in_loop(true);

        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 0);

        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 1);
        assert_eq!(pending(&flusher), 0);

        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 1);

        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 2);

        // Only the first call won the flag; the wake has not run yet
        assert_eq!(lp.submissions(), 1);
    }

    #[test]
    fn test_threshold_fires_exactly_on_kth_call() {
        let k = 5;
        let (lp, channel, flusher) = setup(k);
        lp.set_in_loop(true);

        for i in 1..k {
            flusher.request_flush().unwrap();
            assert_eq!(channel.flushes(), 0, "no flush expected on call {}", i);
            assert_eq!(pending(&flusher), i);
        }
        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 1);
        assert_eq!(pending(&flusher), 0);
    }

    #[test]
    fn test_in_line_flush_then_deferred_flush_with_nothing_pending() {
        // The home-loop path flushes in-line AND still schedules a deferred
        // flush; the second one runs with nothing pending.
        let (lp, channel, flusher) = setup(1);
        lp.set_in_loop(true);

        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 1);
        assert_eq!(lp.submissions(), 1);
        assert_eq!(pending(&flusher), 0);

        lp.run_all();
        assert_eq!(channel.flushes(), 2);
        assert_eq!(pending(&flusher), 0);
    }

    #[test]
    fn test_deferred_flush_resets_pending() {
        let (lp, channel, flusher) = setup(3);
        lp.set_in_loop(true);

        flusher.request_flush().unwrap();
        flusher.request_flush().unwrap();
        assert_eq!(pending(&flusher), 2);
        assert_eq!(channel.flushes(), 0);

        lp.run_all();
        assert_eq!(channel.flushes(), 1);
        assert_eq!(pending(&flusher), 0);

        // Counter starts over: two more requests stay below the threshold
        flusher.request_flush().unwrap();
        flusher.request_flush().unwrap();
        assert_eq!(channel.flushes(), 1);
        assert_eq!(pending(&flusher), 2);
    }

    #[test]
    fn test_concurrent_requests_coalesce_to_one_submission() {
        let (lp, channel, flusher) = setup(64);
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let flusher = flusher.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..100 {
                        flusher.request_flush().unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(lp.submissions(), 1);
        assert_eq!(channel.flushes(), 0);

        lp.run_all();
        assert_eq!(channel.flushes(), 1);
    }

    #[test]
    fn test_forced_cas_contention_submits_once() {
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let hook_barrier = Arc::clone(&barrier);
        let (lp, channel, flusher) = setup(64);
        // Every thread reads Idle, then all race the CAS together.
        let flusher = flusher.with_race_hook(move || {
            hook_barrier.wait();
        });

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let flusher = flusher.clone();
                thread::spawn(move || flusher.request_flush().unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(lp.submissions(), 1);
        assert!(scheduled(&flusher));

        lp.run_all();
        assert_eq!(channel.flushes(), 1);
        assert!(!scheduled(&flusher));
    }

    #[test]
    fn test_wake_reopens_flag_before_flush_runs() {
        let (lp, channel, flusher) = setup(64);

        flusher.request_flush().unwrap();
        assert!(lp.run_one()); // wake only
        assert!(!scheduled(&flusher));
        assert_eq!(lp.queued(), 1);
        assert_eq!(channel.flushes(), 0);

        // A request between wake and flush gets its own wake, queued behind
        // the flush
        flusher.request_flush().unwrap();
        assert_eq!(lp.submissions(), 3);
        assert_eq!(lp.queued(), 2);

        lp.run_all();
        assert_eq!(channel.flushes(), 2);
    }

    #[test]
    fn test_rejected_wake_is_reported_and_flag_reopened() {
        let (lp, channel, flusher) = setup(64);
        lp.close();

        assert_eq!(flusher.request_flush(), Err(FlushError::LoopShutdown));
        assert!(!scheduled(&flusher));
        // Later callers see the same rejection
        assert_eq!(flusher.request_flush(), Err(FlushError::LoopShutdown));
        assert_eq!(lp.submissions(), 0);
        assert_eq!(channel.flushes(), 0);
    }

    #[test]
    fn test_rejected_flush_task_is_logged_not_raised() {
        let (lp, channel, flusher) = setup(64);

        flusher.request_flush().unwrap();
        lp.close();
        lp.run_all();

        assert_eq!(channel.flushes(), 0);
        assert!(!scheduled(&flusher));
    }

    #[test]
    fn test_explicit_event_loop_overrides_channel_loop() {
        let channel_loop = ManualLoop::default();
        let other_loop = ManualLoop::default();
        let channel = Arc::new(CountingChannel {
            flushes: StdAtomicUsize::new(0),
            event_loop: channel_loop.clone(),
        });
        let flusher = BatchFlusher::with_event_loop(Arc::clone(&channel), other_loop.clone());

        flusher.request_flush().unwrap();
        assert_eq!(channel_loop.submissions(), 0);
        assert_eq!(other_loop.submissions(), 1);

        other_loop.run_all();
        assert_eq!(channel.flushes(), 1);
    }

    #[test]
    fn test_zero_max_pending_rejected() {
        let lp = ManualLoop::default();
        let channel = Arc::new(CountingChannel {
            flushes: StdAtomicUsize::new(0),
            event_loop: lp.clone(),
        });
        let result = BatchFlusher::with_max_pending(channel, 0);
        assert!(matches!(result, Err(FlushError::InvalidConfig(_))));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        RequestOffLoop,
        RequestOnLoop,
        RunOne,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::RequestOffLoop),
            Just(Op::RequestOnLoop),
            Just(Op::RunOne),
        ]
    }

    proptest! {
        #[test]
        fn prop_no_herd_and_no_lost_request(
            max_pending in 1usize..6,
            ops in proptest::collection::vec(op(), 1..64),
        ) {
            let (lp, channel, flusher) = setup(max_pending);
            let mut flushes_at_last_request = None;

            for op in ops {
                match op {
                    Op::RequestOffLoop | Op::RequestOnLoop => {
                        lp.set_in_loop(matches!(op, Op::RequestOnLoop));
                        flusher.request_flush().unwrap();
                        lp.set_in_loop(false);
                        flushes_at_last_request = Some(channel.flushes());
                    }
                    Op::RunOne => {
                        lp.run_one();
                    }
                }
                // At most one wake plus the flush it queued
                prop_assert!(lp.queued() <= 2);
                prop_assert!(pending(&flusher) < max_pending);
            }

            lp.run_all();
            if let Some(before) = flushes_at_last_request {
                prop_assert!(channel.flushes() > before);
            }
            prop_assert!(!scheduled(&flusher));
            prop_assert_eq!(pending(&flusher), 0);
        }
    }
}
