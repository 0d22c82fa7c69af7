//! Stress test - many threads requesting flushes on one channel
//!
//! Reports how many real flushes the requests collapsed into.

use batchflush::{BatchFlusher, FlushResult, LoopConfig, LoopThread, WriteChannel};
use clap::Parser;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "stress", about = "Hammer one BatchFlusher from many threads")]
struct Args {
    /// Producer threads
    #[arg(short, long, default_value_t = 8)]
    producers: usize,

    /// Flush requests per producer
    #[arg(short, long, default_value_t = 100_000)]
    requests: u64,

    /// In-line flush threshold for requests made on the loop
    #[arg(short, long, default_value_t = batchflush::DEFAULT_MAX_PENDING)]
    max_pending: usize,

    /// Every Nth request is made from the loop thread (0 = never)
    #[arg(long, default_value_t = 16)]
    on_loop_every: u64,
}

fn main() -> FlushResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    println!("=== batchflush Stress Test ===\n");
    println!(
        "{} producers x {} requests (max_pending={}, on-loop every {})",
        args.producers, args.requests, args.max_pending, args.on_loop_every
    );

    let mut lp = LoopThread::spawn(LoopConfig::from_env().name("stress-loop"))?;
    let handle = lp.handle();
    let channel = Arc::new(WriteChannel::new(io::sink(), handle.clone()));
    let flusher = BatchFlusher::with_max_pending(Arc::clone(&channel), args.max_pending)?;

    let issued = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(args.producers + 1));
    let start = Instant::now();

    let producers: Vec<_> = (0..args.producers)
        .map(|_| {
            let flusher = flusher.clone();
            let channel = Arc::clone(&channel);
            let handle = handle.clone();
            let issued = Arc::clone(&issued);
            let barrier = Arc::clone(&barrier);
            let requests = args.requests;
            let on_loop_every = args.on_loop_every;
            thread::spawn(move || -> FlushResult<()> {
                barrier.wait();
                for i in 0..requests {
                    channel.write(&b"x"[..])?;
                    if on_loop_every != 0 && i % on_loop_every == 0 {
                        let flusher = flusher.clone();
                        handle.submit(move || {
                            if let Err(e) = flusher.request_flush() {
                                warn!(error = %e, "on-loop request failed");
                            }
                        })?;
                    } else {
                        flusher.request_flush()?;
                    }
                    issued.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    barrier.wait();
    for p in producers {
        match p.join() {
            Ok(result) => result?,
            Err(_) => eprintln!("producer thread panicked"),
        }
    }
    let submit_time = start.elapsed();

    // Wait for the loop to catch up: marker task, then one more hop for
    // the flush the last wake queued.
    let (tx, rx) = mpsc::channel();
    let inner = handle.clone();
    handle.submit(move || {
        let marker = inner.submit(move || {
            if tx.send(()).is_err() {
                warn!("drain marker receiver gone");
            }
        });
        if let Err(e) = marker {
            warn!(error = %e, "drain marker rejected");
        }
    })?;
    if rx.recv_timeout(Duration::from_secs(60)).is_err() {
        println!("Timeout waiting for the loop to drain");
    }
    let total_time = start.elapsed();
    lp.shutdown();

    let stats = channel.stats();
    let requests = issued.load(Ordering::Relaxed);
    println!("\n=== Results ===");
    println!("Requests:        {}", requests);
    println!("Writes:          {}", stats.writes);
    println!("Flushes:         {}", stats.flushes);
    println!(
        "Coalescing:      {:.1} requests/flush",
        requests as f64 / stats.flushes.max(1) as f64
    );
    println!("Submit time:     {:?}", submit_time);
    println!("Total time:      {:?}", total_time);
    println!(
        "Throughput:      {:.0} requests/sec",
        requests as f64 / total_time.as_secs_f64()
    );

    println!("\n=== Stress Test Complete ===");
    Ok(())
}
