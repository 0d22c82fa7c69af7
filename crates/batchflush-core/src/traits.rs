//! Channel and event loop capabilities
//!
//! These traits define the interface between the flush coordinator and
//! whatever runtime owns the connection. The coordinator never writes data
//! itself; it only decides when `Channel::flush` runs and submits work to
//! the channel's home `EventLoop`.

use crate::error::FlushResult;

/// A unit of work submitted to an event loop.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The single logical thread that owns a channel and serializes its work.
///
/// **Contract:**
/// - `execute()` must NEVER block the caller.
/// - Tasks run in submission order, from any submitting thread.
/// - Tasks run on the loop's own thread, where `in_event_loop()` is true.
pub trait EventLoop: Send + Sync + 'static {
    /// Whether the calling thread is this loop's thread.
    fn in_event_loop(&self) -> bool;

    /// Enqueue a task for execution on the loop thread.
    ///
    /// Returns `FlushError::LoopShutdown` if the loop no longer accepts work.
    fn execute(&self, task: Task) -> FlushResult<()>;
}

/// An open output connection with a write buffer.
pub trait Channel: Send + Sync + 'static {
    /// The channel's intrinsic home loop.
    type Loop: EventLoop;

    /// Flush everything written so far to the underlying sink.
    ///
    /// Only called on the home loop. Must be safe to call with nothing
    /// pending. Failures are the channel's to report.
    fn flush(&self);

    /// The loop that owns this channel.
    fn event_loop(&self) -> Self::Loop;
}
