//! End-to-end throughput benchmark for Beacon.
//!
//! Connects WebSocket subscribers to a running server, then submits events
//! over HTTP as fast as a set of producers can and counts what arrives.
//!
//! ```bash
//! e2e_throughput [subscribers] [producers]
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_bench::post_event;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const INGEST_ADDR: &str = "127.0.0.1:8080";
const SUBSCRIBE_URL: &str = "ws://127.0.0.1:8081";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    received: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.accepted.store(0, Ordering::SeqCst);
        self.rejected.store(0, Ordering::SeqCst);
        self.received.store(0, Ordering::SeqCst);
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_subscribers = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);
    let num_producers = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(4);

    let ingest_addr: SocketAddr = match INGEST_ADDR.parse() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Invalid ingestion address: {}", e);
            return;
        }
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         Beacon End-to-End Throughput Benchmark               ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_benchmark(ingest_addr, num_subscribers, num_producers).await;
}

async fn run_benchmark(ingest_addr: SocketAddr, num_subscribers: usize, num_producers: usize) {
    println!(
        "📊 Broadcast Benchmark: {} subscribers, {} producers",
        num_subscribers, num_producers
    );
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let counters = Arc::new(Counters::default());
    let barrier = Arc::new(Barrier::new(num_subscribers + 1));

    let mut handles = Vec::new();

    for subscriber_id in 0..num_subscribers {
        let counters = Arc::clone(&counters);
        let barrier = Arc::clone(&barrier);

        handles.push(tokio::spawn(async move {
            if let Err(e) = run_subscriber(counters, barrier).await {
                eprintln!("Subscriber {} error: {}", subscriber_id, e);
            }
        }));
    }

    // Wait for all subscribers to connect
    barrier.wait().await;
    println!("✓ All {} subscribers connected", num_subscribers);

    for producer_id in 0..num_producers {
        let counters = Arc::clone(&counters);
        handles.push(tokio::spawn(run_producer(producer_id, ingest_addr, counters)));
    }

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    counters.reset();
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed().as_secs_f64();
    let accepted = counters.accepted.load(Ordering::SeqCst);
    let rejected = counters.rejected.load(Ordering::SeqCst);
    let received = counters.received.load(Ordering::SeqCst);

    let fanout_ratio = if accepted == 0 {
        0.0
    } else {
        received as f64 / (accepted as f64 * num_subscribers as f64)
    };

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Subscribers:          {:>10}                            ║", num_subscribers);
    println!("║  Duration:             {:>10.2}s                           ║", elapsed);
    println!("║  Events Accepted:      {:>10}                            ║", accepted);
    println!("║  Events Rejected:      {:>10}                            ║", rejected);
    println!("║  Ingest Rate:          {:>10.0} ev/s                       ║", accepted as f64 / elapsed);
    println!("║  Delivered:            {:>10}                            ║", received);
    println!("║  Delivery Rate:        {:>10.0} msg/s                      ║", received as f64 / elapsed);
    println!("║  Fan-out Completeness: {:>10.1}%                           ║", fanout_ratio * 100.0);
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

async fn run_subscriber(
    counters: Arc<Counters>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws, _) = connect_async(SUBSCRIBE_URL).await?;

    barrier.wait().await;

    // Reading also answers the server's probes.
    while let Some(message) = ws.next().await {
        if let Message::Text(_) = message? {
            counters.received.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}

async fn run_producer(producer_id: usize, addr: SocketAddr, counters: Arc<Counters>) {
    let mut seq = 0u64;
    loop {
        seq += 1;
        match post_event(addr, "bench", &json!({ "producer": producer_id, "seq": seq })).await {
            Ok(200) => {
                counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(_) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                eprintln!("Producer {} error: {}", producer_id, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
