//! Order placement benchmarks over in-memory stores.
//!
//! Measures coordinator overhead on the hot path:
//! - single-line and multi-line admission
//! - contended admission (many tasks, one product)
//! - ledger application of queued adjustments
//!
//! Run with: `cargo bench -p ordersystem-runtime`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used, clippy::unwrap_used)] // Benchmarks can use expect for setup

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ordersystem_core::{OrderLine, ProductId};
use ordersystem_testing::TestHarness;

const PLENTY: i64 = i64::MAX / 4;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create runtime")
}

fn bench_admission(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("admission");

    for lines in [1_i64, 5, 20] {
        let harness = TestHarness::new();
        let request: Vec<_> = (1..=lines)
            .map(|id| OrderLine::new(harness.seed_product(id, "Widget", PLENTY), 1))
            .collect();
        let buyer = harness.register_member("bench@example.com");
        let coordinator = harness.coordinator();

        group.throughput(Throughput::Elements(lines.unsigned_abs()));
        group.bench_with_input(BenchmarkId::new("create_order", lines), &request, |b, request| {
            b.to_async(&runtime).iter(|| async {
                black_box(coordinator.create_order(&buyer, request).await.unwrap());
            });
        });
    }

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("contention");

    for tasks in [10_u64, 100] {
        let harness = TestHarness::new();
        let product = harness.seed_product(1, "Widget", PLENTY);
        let buyer = harness.register_member("bench@example.com");
        let coordinator = Arc::new(harness.coordinator());

        group.throughput(Throughput::Elements(tasks));
        group.bench_function(BenchmarkId::new("concurrent_orders", tasks), |b| {
            b.to_async(&runtime).iter(|| async {
                let handles: Vec<_> = (0..tasks)
                    .map(|_| {
                        let coordinator = Arc::clone(&coordinator);
                        let buyer = buyer.clone();
                        tokio::spawn(async move {
                            coordinator
                                .create_order(&buyer, &[OrderLine::new(product, 1)])
                                .await
                        })
                    })
                    .collect();
                for handle in handles {
                    black_box(handle.await.unwrap().unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_ledger_apply(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("ledger");
    group.throughput(Throughput::Elements(100));

    group.bench_function("drain_100_adjustments", |b| {
        b.to_async(&runtime).iter(|| async {
            let harness = TestHarness::new();
            let product = harness.seed_product(1, "Widget", 1_000);
            let buyer = harness.register_member("bench@example.com");
            let coordinator = harness.coordinator();
            for _ in 0..100 {
                coordinator
                    .create_order(&buyer, &[OrderLine::new(product, 1)])
                    .await
                    .unwrap();
            }
            black_box(harness.drain_queue().await);
            debug_assert_eq!(harness.ledger.stock(ProductId::new(1)), Some(900));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_admission, bench_contention, bench_ledger_apply);
criterion_main!(benches);
