//! Latency benchmarks for Switchyard.
//!
//! These benchmarks focus on subscription churn and contended publishing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use switchyard_core::{Router, RouterConfig};

/// Benchmark subscribe + unsubscribe round trips.
fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    group.bench_function("fresh_route", |b| {
        let router = Router::<u64>::new(4).unwrap();
        let mut route = 0u64;
        b.iter(|| {
            route += 1;
            let sub = router.subscribe(black_box(route));
            router.unsubscribe(&sub);
        });
    });

    group.bench_function("shared_route", |b| {
        let router = Router::<u64>::new(4).unwrap();
        // Keeps the entry alive so only the set changes.
        let _anchor = router.subscribe(1);
        b.iter(|| {
            let sub = router.subscribe(black_box(1));
            router.unsubscribe(&sub);
        });
    });

    group.finish();
}

/// Benchmark publish latency while other threads publish to unrelated routes.
fn bench_contended_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_publish");

    for shards in [4usize, 64] {
        group.bench_function(format!("{shards}_shards"), |b| {
            b.iter_custom(|iters| {
                let config = RouterConfig::new(1).with_shard_amount(shards);
                let router = Arc::new(Router::<u64>::with_config(config).unwrap());
                let subs: Vec<_> = (0..64).map(|route| router.subscribe(route)).collect();

                let workers: Vec<_> = (1..4u64)
                    .map(|t| {
                        let router = Arc::clone(&router);
                        thread::spawn(move || {
                            for i in 0..iters {
                                router.publish(t * 16 + i % 16, i);
                            }
                        })
                    })
                    .collect();

                let start = Instant::now();
                for i in 0..iters {
                    router.publish(black_box(i % 16), i);
                }
                let elapsed = start.elapsed();

                for worker in workers {
                    worker.join().unwrap();
                }
                drop(subs);
                elapsed
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_churn, bench_contended_publish);
criterion_main!(benches);
