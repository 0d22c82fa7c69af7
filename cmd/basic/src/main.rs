//! Basic batchflush example
//!
//! One loop, one channel over stdout, a handful of writes from a foreign
//! thread with a flush requested after each.
//!
//! # Environment Variables
//!
//! - `RUST_LOG=batchflush=trace` - show wake/flush scheduling
//! - `BATCHFLUSH_MAX_PENDING=<n>` - in-line flush threshold

use batchflush::{BatchFlusher, FlushResult, FlusherConfig, LoopConfig, LoopThread, WriteChannel};
use std::io::{self, BufWriter};
use std::sync::Arc;
use std::thread;
use tracing::info;

// RUST_LOG=batchflush=trace cargo run -p batchflush-basic
fn main() -> FlushResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("=== batchflush Basic Example ===\n");

    let mut lp = LoopThread::spawn(LoopConfig::from_env())?;
    let handle = lp.handle();
    let channel = Arc::new(WriteChannel::new(BufWriter::new(io::stdout()), handle.clone()));
    let flusher = BatchFlusher::with_config(Arc::clone(&channel), handle, FlusherConfig::from_env())?;
    info!(?flusher, loop_id = %lp.id(), "flusher ready");

    let producer = {
        let channel = Arc::clone(&channel);
        let flusher = flusher.clone();
        thread::spawn(move || -> FlushResult<()> {
            for i in 1..=5 {
                channel.write(format!("line {i} from producer\n"))?;
                flusher.request_flush()?;
            }
            Ok(())
        })
    };
    match producer.join() {
        Ok(result) => result?,
        Err(_) => eprintln!("producer thread panicked"),
    }

    // Drains the queued wake and flush before returning
    lp.shutdown();

    let stats = channel.stats();
    println!("\n=== Results ===");
    println!("Writes:   {}", stats.writes);
    println!("Bytes:    {}", stats.bytes);
    println!("Flushes:  {}", stats.flushes);
    println!("Errors:   {}", stats.errors);
    Ok(())
}
