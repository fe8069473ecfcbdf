//! Property tests for stock admission under concurrency.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use std::collections::HashMap;
use std::sync::Arc;

use ordersystem_core::{OrderLine, ProductId};
use ordersystem_testing::TestHarness;
use ordersystem_testing::properties::order_request;
use proptest::prelude::*;

const PRODUCTS: i64 = 3;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("test runtime")
}

fn seeded(stock: i64) -> TestHarness {
    let harness = TestHarness::new();
    for id in 1..=PRODUCTS {
        harness.seed_product(id, "Widget", stock);
    }
    harness
}

fn demand(lines: &[OrderLine]) -> HashMap<ProductId, i64> {
    let mut totals = HashMap::new();
    for line in lines {
        *totals.entry(line.product_id).or_insert(0) += i64::from(line.quantity);
    }
    totals
}

/// Run every request concurrently and return the admitted ones.
async fn place_concurrently(
    harness: &TestHarness,
    requests: Vec<Vec<OrderLine>>,
) -> Vec<(ordersystem_core::OrderId, Vec<OrderLine>)> {
    let coordinator = Arc::new(harness.coordinator());
    let buyer = harness.register_member("buyer@example.com");

    let handles: Vec<_> = requests
        .into_iter()
        .map(|lines| {
            let coordinator = Arc::clone(&coordinator);
            let buyer = buyer.clone();
            tokio::spawn(async move {
                let result = coordinator.create_order(&buyer, &lines).await;
                result.ok().map(|order_id| (order_id, lines))
            })
        })
        .collect();

    let mut admitted = Vec::new();
    for handle in handles {
        if let Some(order) = handle.await.unwrap() {
            admitted.push(order);
        }
    }
    admitted
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn admitted_orders_never_exceed_stock(
        stock in 0i64..20,
        requests in prop::collection::vec(order_request(PRODUCTS, 6, 3), 1..12),
    ) {
        let harness = seeded(stock);
        let (admitted, counters, ledger) = runtime().block_on(async {
            let admitted = place_concurrently(&harness, requests).await;
            harness.drain_queue().await;
            let counters: Vec<_> = (1..=PRODUCTS)
                .map(|id| harness.counters.value(ProductId::new(id)).unwrap())
                .collect();
            let ledger: Vec<_> = (1..=PRODUCTS)
                .map(|id| harness.ledger.stock(ProductId::new(id)).unwrap())
                .collect();
            (admitted, counters, ledger)
        });

        let all_lines: Vec<_> = admitted.iter().flat_map(|(_, lines)| lines.clone()).collect();
        let sold = demand(&all_lines);
        for id in 1..=PRODUCTS {
            let product = ProductId::new(id);
            let sold = sold.get(&product).copied().unwrap_or(0);
            let index = usize::try_from(id - 1).unwrap();
            prop_assert!(sold <= stock);
            prop_assert_eq!(counters[index], stock - sold);
            prop_assert_eq!(ledger[index], counters[index]);
        }
        prop_assert_eq!(harness.orders.len(), admitted.len());
    }

    #[test]
    fn rejected_orders_leave_counters_untouched(
        stock in 0i64..5,
        lines in order_request(PRODUCTS, 8, 4),
    ) {
        let harness = seeded(stock);
        let result = runtime().block_on(async {
            let buyer = harness.register_member("buyer@example.com");
            harness.coordinator().create_order(&buyer, &lines).await
        });

        let needed = demand(&lines);
        let fits = needed.values().all(|quantity| *quantity <= stock);
        prop_assert_eq!(result.is_ok(), fits);
        for id in 1..=PRODUCTS {
            let product = ProductId::new(id);
            let expected = if fits {
                stock - needed.get(&product).copied().unwrap_or(0)
            } else {
                stock
            };
            prop_assert_eq!(harness.counters.value(product), Some(expected));
        }
    }

    #[test]
    fn cancelling_everything_restores_seeded_stock(
        stock in 5i64..30,
        requests in prop::collection::vec(order_request(PRODUCTS, 5, 3), 1..10),
    ) {
        let harness = seeded(stock);
        runtime().block_on(async {
            let admitted = place_concurrently(&harness, requests).await;
            let coordinator = harness.coordinator();
            for (order_id, _) in admitted {
                coordinator.cancel_order(order_id).await.unwrap();
            }
            harness.drain_queue().await;
        });

        for id in 1..=PRODUCTS {
            let product = ProductId::new(id);
            prop_assert_eq!(harness.counters.value(product), Some(stock));
            prop_assert_eq!(harness.ledger.stock(product), Some(stock));
        }
    }

    #[test]
    fn redelivery_never_double_applies(
        requests in prop::collection::vec(order_request(PRODUCTS, 3, 2), 1..8),
    ) {
        let harness = seeded(100);
        runtime().block_on(async {
            place_concurrently(&harness, requests).await;
            harness.queue.deliver_twice(true);
            harness.drain_queue().await;
        });

        for id in 1..=PRODUCTS {
            let product = ProductId::new(id);
            prop_assert_eq!(harness.ledger.stock(product), harness.counters.value(product));
        }
        prop_assert_eq!(harness.ledger.applied_count(), harness.queue.published().len());
    }
}
