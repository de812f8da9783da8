//! Benchmarks for the scheduled executor.
//!
//! Benchmarks cover:
//! - Ready queue insert/cancel churn (virtual clock, nothing runs)
//! - Submit-to-result latency through the dispatcher and worker pool
//! - Burst submission with elastic pool growth
//! - `invoke_all` / `invoke_any` aggregates

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use prometheus_scheduled_executor::{Callable, ScheduledExecutor, VirtualTimeSource};

// ============================================================================
// Helper Functions
// ============================================================================

fn virtual_executor() -> ScheduledExecutor {
    ScheduledExecutor::with_time_source(Arc::new(VirtualTimeSource::new()))
        .expect("executor should start")
}

fn callables(count: u64) -> Vec<Callable<u64>> {
    (0..count)
        .map(|i| Box::new(move || Ok(i * 2)) as Callable<u64>)
        .collect()
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_schedule_then_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_schedule_cancel");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let executor = virtual_executor();
            let mut rng = rand::rng();
            b.iter(|| {
                let handles: Vec<_> = (0..size)
                    .map(|_| {
                        let delay = Duration::from_millis(rng.random_range(1..60_000));
                        executor.schedule(|| {}, delay).expect("schedule")
                    })
                    .collect();
                for handle in &handles {
                    black_box(handle.cancel(false));
                }
            });
            executor.shutdown_now();
        });
    }

    group.finish();
}

// ============================================================================
// Execution Benchmarks
// ============================================================================

fn bench_submit_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_roundtrip");
    let executor = ScheduledExecutor::new().expect("executor should start");

    group.bench_function("submit_callable_get", |b| {
        b.iter(|| {
            let handle = executor.submit_callable(|| Ok(black_box(7u64))).expect("submit");
            black_box(handle.get().expect("result"))
        });
    });

    group.finish();
    executor.shutdown();
}

fn bench_burst_submission(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst_submission");
    group.sample_size(20);
    let executor = ScheduledExecutor::new().expect("executor should start");

    for size in [10u64, 100, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let handles: Vec<_> = (0..size)
                    .map(|i| executor.submit_callable(move || Ok(i)).expect("submit"))
                    .collect();
                for handle in handles {
                    black_box(handle.get().expect("result"));
                }
            });
        });
    }

    group.finish();
    executor.shutdown();
}

fn bench_aggregates(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregates");
    let executor = ScheduledExecutor::new().expect("executor should start");

    group.bench_function("invoke_all_32", |b| {
        b.iter(|| {
            let handles = executor.invoke_all(callables(32)).expect("invoke_all");
            black_box(handles.len())
        });
    });

    group.bench_function("invoke_any_32", |b| {
        b.iter(|| black_box(executor.invoke_any(callables(32)).expect("invoke_any")));
    });

    group.finish();
    executor.shutdown();
}

criterion_group!(queue_benches, bench_schedule_then_cancel);

criterion_group!(
    execution_benches,
    bench_submit_roundtrip,
    bench_burst_submission,
    bench_aggregates
);

criterion_main!(queue_benches, execution_benches);
