//! Order listings and counter seeding.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use ordersystem_core::{OrderError, OrderLine, OrderStatus, Principal, Product, ProductId};
use ordersystem_runtime::{SeedError, seed_counters};
use ordersystem_testing::TestHarness;

#[tokio::test]
async fn list_all_shows_every_order_with_product_names() {
    let harness = TestHarness::new();
    let lamp = harness.seed_product(1, "Lamp", 10);
    let bulb = harness.seed_product(2, "Bulb", 10);
    let alice = harness.register_member("alice@example.com");
    let bob = harness.register_member("bob@example.com");
    let coordinator = harness.coordinator();

    let first = coordinator
        .create_order(&alice, &[OrderLine::new(lamp, 1), OrderLine::new(bulb, 2)])
        .await
        .unwrap();
    coordinator
        .create_order(&bob, &[OrderLine::new(bulb, 3)])
        .await
        .unwrap();
    coordinator.cancel_order(first).await.unwrap();

    let views = harness.queries().list_all().await.unwrap();
    assert_eq!(views.len(), 2);

    assert_eq!(views[0].id, first);
    assert_eq!(views[0].member_email, "alice@example.com");
    assert_eq!(views[0].order_status, OrderStatus::Canceled);
    let names: Vec<_> = views[0]
        .order_details
        .iter()
        .map(|d| (d.product_name.as_str(), d.product_count))
        .collect();
    assert_eq!(names, vec![("Lamp", 1), ("Bulb", 2)]);

    assert_eq!(views[1].member_email, "bob@example.com");
    assert_eq!(views[1].order_status, OrderStatus::Ordered);
}

#[tokio::test]
async fn my_orders_only_returns_the_callers_orders() {
    let harness = TestHarness::new();
    let lamp = harness.seed_product(1, "Lamp", 10);
    let alice = harness.register_member("alice@example.com");
    let bob = harness.register_member("bob@example.com");
    let coordinator = harness.coordinator();

    for principal in [&alice, &bob, &alice] {
        coordinator
            .create_order(principal, &[OrderLine::new(lamp, 1)])
            .await
            .unwrap();
    }

    let queries = harness.queries();
    let mine = queries.my_orders(&alice).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|v| v.member_email == "alice@example.com"));

    assert_eq!(
        queries.my_orders(&Principal::new("")).await.unwrap_err(),
        OrderError::Unauthenticated
    );
}

#[tokio::test]
async fn listing_serializes_in_camel_case() {
    let harness = TestHarness::new();
    let lamp = harness.seed_product(1, "Lamp", 10);
    let alice = harness.register_member("alice@example.com");
    harness
        .coordinator()
        .create_order(&alice, &[OrderLine::new(lamp, 2)])
        .await
        .unwrap();

    let views = harness.queries().list_all().await.unwrap();
    let json = serde_json::to_value(&views).unwrap();

    let order = &json[0];
    assert_eq!(order["memberEmail"], "alice@example.com");
    assert_eq!(order["orderStatus"], "ORDERED");
    assert_eq!(order["orderDetails"][0]["productName"], "Lamp");
    assert_eq!(order["orderDetails"][0]["productCount"], 2);
    assert!(order["orderDetails"][0]["detailId"].is_string());
}

#[tokio::test]
async fn seeding_fills_only_missing_counters() {
    let harness = TestHarness::new();
    for (id, stock) in [(1, 10), (2, 0), (3, 42)] {
        harness.ledger.insert_product(Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            category: Some("hardware".to_string()),
            stock_quantity: stock,
        });
    }
    // A live counter from an earlier run is kept
    harness.counters.seed(ProductId::new(1), 7);

    let seeded = seed_counters(&harness.ledger, &harness.counters)
        .await
        .unwrap();

    assert_eq!(seeded, 2);
    assert_eq!(harness.counters.value(ProductId::new(1)), Some(7));
    assert_eq!(harness.counters.value(ProductId::new(2)), Some(0));
    assert_eq!(harness.counters.value(ProductId::new(3)), Some(42));
}

#[tokio::test]
async fn seeding_reports_store_failures() {
    let harness = TestHarness::new();
    harness.seed_product(1, "Lamp", 10);

    harness.ledger.fail_next(1);
    assert!(matches!(
        seed_counters(&harness.ledger, &harness.counters).await,
        Err(SeedError::Ledger(_))
    ));

    harness.counters.fail_next(1);
    assert!(matches!(
        seed_counters(&harness.ledger, &harness.counters).await,
        Err(SeedError::Counter(_))
    ));
}

#[tokio::test]
async fn seeded_counters_admit_orders() {
    let harness = TestHarness::new();
    harness.ledger.insert_product(Product {
        id: ProductId::new(9),
        name: "Desk".to_string(),
        category: None,
        stock_quantity: 2,
    });
    let buyer = harness.register_member("buyer@example.com");
    let coordinator = harness.coordinator();

    assert_eq!(
        coordinator.available_stock(ProductId::new(9)).await.unwrap_err(),
        OrderError::ProductNotFound(ProductId::new(9))
    );

    seed_counters(&harness.ledger, &harness.counters)
        .await
        .unwrap();
    assert_eq!(coordinator.available_stock(ProductId::new(9)).await.unwrap(), 2);
    coordinator
        .create_order(&buyer, &[OrderLine::new(ProductId::new(9), 2)])
        .await
        .unwrap();
    assert_eq!(coordinator.available_stock(ProductId::new(9)).await.unwrap(), 0);
}

#[tokio::test]
async fn reseeding_with_pending_adjustments_does_not_oversell() {
    let harness = TestHarness::new();
    let lamp = harness.seed_product(1, "Lamp", 10);
    let buyer = harness.register_member("buyer@example.com");
    let coordinator = harness.coordinator();

    coordinator
        .create_order(&buyer, &[OrderLine::new(lamp, 6)])
        .await
        .unwrap();
    assert_eq!(harness.counters.value(lamp), Some(4));
    assert_eq!(harness.ledger.stock(lamp), Some(10));

    // Worker restart before the debit reached the ledger
    let seeded = seed_counters(&harness.ledger, &harness.counters)
        .await
        .unwrap();
    assert_eq!(seeded, 0);
    assert_eq!(harness.counters.value(lamp), Some(4));

    let err = coordinator
        .create_order(&buyer, &[OrderLine::new(lamp, 6)])
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InsufficientStock { .. }));

    harness.drain_queue().await;
    assert_eq!(harness.orders.len(), 1);
    assert_eq!(harness.ledger.stock(lamp), Some(4));
    assert!(harness.dead_letters.parked().is_empty());
}
