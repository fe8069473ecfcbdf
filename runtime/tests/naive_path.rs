//! The naive placement path: check-then-write inside the order store.
//!
//! Correct when requests are serialized; loses updates when they interleave.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use ordersystem_core::{OrderError, OrderLine, ProductId};
use ordersystem_testing::TestHarness;

#[tokio::test]
async fn sequential_naive_orders_debit_the_ledger() {
    let harness = TestHarness::new();
    let p1 = harness.seed_product(1, "Lamp", 10);
    let p2 = harness.seed_product(2, "Bulb", 10);
    let buyer = harness.register_member("buyer@example.com");
    let coordinator = harness.coordinator();

    coordinator
        .create_order_naive(&buyer, &[OrderLine::new(p1, 3), OrderLine::new(p2, 1)])
        .await
        .unwrap();
    coordinator
        .create_order_naive(&buyer, &[OrderLine::new(p1, 7)])
        .await
        .unwrap();

    assert_eq!(harness.ledger.stock(p1), Some(0));
    assert_eq!(harness.ledger.stock(p2), Some(9));
    assert_eq!(harness.orders.len(), 2);
    // The naive path never touches counters or the queue
    assert_eq!(harness.counters.value(p1), Some(10));
    assert!(harness.queue.published().is_empty());
}

#[tokio::test]
async fn naive_shortfall_rolls_back_earlier_lines() {
    let harness = TestHarness::new();
    let p1 = harness.seed_product(1, "Lamp", 10);
    let p2 = harness.seed_product(2, "Bulb", 1);
    let buyer = harness.register_member("buyer@example.com");

    let err = harness
        .coordinator()
        .create_order_naive(&buyer, &[OrderLine::new(p1, 4), OrderLine::new(p2, 2)])
        .await
        .unwrap_err();

    assert_eq!(
        err,
        OrderError::InsufficientStock {
            product_id: p2,
            requested: 2,
            remaining: 1,
        }
    );
    assert_eq!(harness.ledger.stock(p1), Some(10));
    assert_eq!(harness.ledger.stock(p2), Some(1));
    assert!(harness.orders.is_empty());
}

#[tokio::test]
async fn naive_path_rejects_unknown_products_and_callers() {
    let harness = TestHarness::new();
    harness.seed_product(1, "Lamp", 10);
    let buyer = harness.register_member("buyer@example.com");
    let coordinator = harness.coordinator();
    let unknown = ProductId::new(77);

    assert_eq!(
        coordinator
            .create_order_naive(&buyer, &[OrderLine::new(unknown, 1)])
            .await
            .unwrap_err(),
        OrderError::ProductNotFound(unknown)
    );
    assert!(matches!(
        coordinator
            .create_order_naive(&buyer, &[])
            .await
            .unwrap_err(),
        OrderError::Validation(_)
    ));
    assert!(harness.orders.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn interleaved_naive_orders_lose_an_update() {
    let harness = TestHarness::new();
    let p1 = harness.seed_product(1, "Lamp", 10);
    let alice = harness.register_member("alice@example.com");
    let bob = harness.register_member("bob@example.com");
    let coordinator = harness.coordinator();

    let lines = [OrderLine::new(p1, 6)];
    let (first, second) = tokio::join!(
        coordinator.create_order_naive(&alice, &lines),
        coordinator.create_order_naive(&bob, &lines),
    );

    // Both read 10 before either wrote: 12 units sold from 10, ledger shows 4
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(harness.orders.len(), 2);
    assert_eq!(harness.ledger.stock(p1), Some(4));
}

#[tokio::test(flavor = "current_thread")]
async fn interleaved_counter_orders_do_not_oversell() {
    let harness = TestHarness::new();
    let p1 = harness.seed_product(1, "Lamp", 10);
    let alice = harness.register_member("alice@example.com");
    let bob = harness.register_member("bob@example.com");
    let coordinator = harness.coordinator();

    let lines = [OrderLine::new(p1, 6)];
    let (first, second) = tokio::join!(
        coordinator.create_order(&alice, &lines),
        coordinator.create_order(&bob, &lines),
    );

    assert!(first.is_ok() ^ second.is_ok());
    assert_eq!(harness.orders.len(), 1);
    assert_eq!(harness.counters.value(p1), Some(4));
    harness.drain_queue().await;
    assert_eq!(harness.ledger.stock(p1), Some(4));
}
