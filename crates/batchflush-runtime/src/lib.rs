//! # batchflush-runtime
//!
//! Reference collaborators for the batchflush coordinator.
//!
//! This crate provides:
//! - A dedicated-thread FIFO event loop (`LoopThread`, `LoopHandle`)
//! - Idle parking for the loop thread (futex on Linux, condvar elsewhere)
//! - Thread-local tracking of which loop the current thread runs
//! - `WriteChannel`, a `Channel` over any `std::io::Write`

pub mod config;
pub mod event_loop;
pub mod channel;
pub mod tls;
pub mod parking;

// Re-exports
pub use config::LoopConfig;
pub use event_loop::{LoopHandle, LoopId, LoopThread};
pub use channel::{ChannelStats, WriteChannel};
pub use parking::{new_parking, LoopParking};
