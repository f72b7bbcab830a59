//! Throughput benchmarks for Beacon.
//!
//! These benchmarks measure the in-process cost of queueing and fanning out
//! events, without network I/O.

use std::sync::Arc;

use beacon_bench::{drain_outboxes, populate};
use beacon_core::{
    BroadcastLoop, Event, EventQueue, LivenessMonitor, LivenessPolicy, SubscriberRegistry,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

/// Benchmark queue push and drain.
fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    group.throughput(Throughput::Elements(1));
    group.bench_function("push", |b| {
        let queue = EventQueue::new();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            if n % 4096 == 0 {
                let _ = queue.drain();
            }
            queue.push(Event::new("bench", json!(n))).unwrap()
        });
    });

    group.throughput(Throughput::Elements(1000));
    group.bench_function("push_drain_1000", |b| {
        let queue = EventQueue::new();
        b.iter(|| {
            for n in 0..1000 {
                queue.push(Event::new("bench", json!(n))).unwrap();
            }
            black_box(queue.drain())
        });
    });

    group.finish();
}

/// Benchmark one event fanned out to many subscribers.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let queue = Arc::new(EventQueue::new());
            let registry = Arc::new(SubscriberRegistry::new());
            let mut outboxes = populate(&registry, size, 16);
            let broadcast = BroadcastLoop::new(Arc::clone(&queue), Arc::clone(&registry));

            b.iter(|| {
                queue
                    .push(Event::new("broadcast", json!({"blob": "x".repeat(64)})))
                    .unwrap();
                let report = broadcast.tick();
                drain_outboxes(&mut outboxes);
                black_box(report)
            });
        });
    }

    group.finish();
}

/// Benchmark a burst of events drained in a single tick.
fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst");

    let queue = Arc::new(EventQueue::new());
    let registry = Arc::new(SubscriberRegistry::new());
    let mut outboxes = populate(&registry, 10, 256);
    let broadcast = BroadcastLoop::new(Arc::clone(&queue), Arc::clone(&registry));

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_events_10_subs", |b| {
        b.iter(|| {
            for n in 0..100 {
                queue.push(Event::new("burst", json!(n))).unwrap();
            }
            let report = broadcast.tick();
            drain_outboxes(&mut outboxes);
            black_box(report)
        });
    });

    group.finish();
}

/// Benchmark liveness sweeps over an idle-free registry.
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("liveness_sweep");

    for size in [100, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let registry = Arc::new(SubscriberRegistry::new());
            let _outboxes = populate(&registry, size, 16);
            let monitor = LivenessMonitor::new(Arc::clone(&registry), LivenessPolicy::default());

            b.iter(|| black_box(monitor.sweep()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_queue, bench_fanout, bench_burst, bench_sweep);
criterion_main!(benches);
