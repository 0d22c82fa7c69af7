//! # batchflush - write-coalescing flush scheduler
//!
//! Collapses many "flush pending output" requests on a channel into the
//! fewest real flushes, while every request is still honored by some
//! later flush on the channel's home event loop.
//!
//! ## Quick Start
//!
//! ```ignore
//! use batchflush::{BatchFlusher, LoopConfig, LoopThread, WriteChannel};
//! use std::sync::Arc;
//!
//! let lp = LoopThread::spawn(LoopConfig::default())?;
//! let channel = Arc::new(WriteChannel::new(socket_writer, lp.handle()));
//! let flusher = BatchFlusher::new(Arc::clone(&channel));
//!
//! // From any thread:
//! channel.write(b"GET / HTTP/1.1\r\n\r\n".to_vec())?;
//! flusher.request_flush()?;
//! ```
//!
//! ## How requests coalesce
//!
//! ```text
//!  any thread                         home loop (FIFO)
//!  ──────────                         ────────────────
//!  request_flush()
//!    ├─ on loop? pending += 1,
//!    │  flush in-line at max_pending
//!    └─ Idle ─CAS─► Scheduled ──────► [write][write][wake]
//!       (losers and Scheduled                         │ flag = Idle
//!        callers return)                              ▼
//!                                     [write][flush] ◄┘ pending = 0,
//!                                                       channel.flush()
//! ```

pub mod config;
pub mod flusher;
mod sync;

pub use config::FlusherConfig;
pub use flusher::BatchFlusher;

// Re-export core types
pub use batchflush_core::{Channel, EventLoop, FlushError, FlushResult, Task};
pub use batchflush_core::constants::DEFAULT_MAX_PENDING;

// Re-export the reference runtime
pub use batchflush_runtime::{
    ChannelStats,
    LoopConfig,
    LoopHandle,
    LoopId,
    LoopThread,
    WriteChannel,
};
