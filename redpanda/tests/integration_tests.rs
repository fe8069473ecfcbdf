//! Integration tests for [`RedpandaStockQueue`] against a real broker.
//!
//! These tests use testcontainers to start Kafka and check:
//! - Publish/subscribe round-trip keyed by product
//! - Redelivery of a rejected message before later ones
//! - The full path from order placement to the ledger
//!
//! # Running These Tests
//!
//! Marked `#[ignore]`: they need Docker and take 15-60 seconds each.
//!
//! ```bash
//! cargo test -p ordersystem-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use ordersystem_core::{
    AdjustmentHandler, HandlerError, OrderId, OrderLine, ProductId, StockAdjustment,
    StockAdjustmentQueue,
};
use ordersystem_redpanda::RedpandaStockQueue;
use ordersystem_runtime::{OrderCoordinator, StockWorker};
use ordersystem_testing::TestHarness;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio::sync::broadcast;

#[derive(Default)]
struct Collecting {
    seen: Mutex<Vec<StockAdjustment>>,
    reject_first: AtomicUsize,
}

impl AdjustmentHandler for Collecting {
    fn handle<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(adjustment.clone());
            let rejected = self
                .reject_first
                .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                    n.checked_sub(1)
                })
                .is_ok();
            if rejected {
                return Err(HandlerError("not yet".to_string()));
            }
            Ok(())
        })
    }
}

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");
    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    (kafka, format!("{host}:{port}"))
}

fn queue(brokers: &str, topic: &str, group: &str) -> RedpandaStockQueue {
    RedpandaStockQueue::builder()
        .brokers(brokers)
        .topic(topic)
        .consumer_group(group)
        .redelivery_delay(Duration::from_millis(50))
        .build()
        .expect("Failed to create queue")
}

/// Publish until the topic is auto-created and accepts writes.
async fn publish_when_ready(queue: &RedpandaStockQueue, adjustment: &StockAdjustment) {
    for attempt in 1..=60 {
        if queue.publish(adjustment).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(attempt != 60, "Kafka never accepted a publish");
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timeout waiting for {what}"));
}

#[tokio::test]
#[ignore]
async fn adjustments_round_trip_in_per_product_order() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = Arc::new(queue(&brokers, "round-trip", "round-trip-worker"));

    let order_id = OrderId::new();
    let events = vec![
        StockAdjustment::consume(ProductId::new(1), 1, order_id, Utc::now()),
        StockAdjustment::consume(ProductId::new(2), 2, order_id, Utc::now()),
        StockAdjustment::consume(ProductId::new(1), 3, order_id, Utc::now()),
    ];
    publish_when_ready(&queue, &events[0]).await;
    for event in &events[1..] {
        queue.publish(event).await.expect("publish");
    }

    let handler = Arc::new(Collecting::default());
    let subscription = {
        let queue = Arc::clone(&queue);
        let handler: Arc<dyn AdjustmentHandler> = handler.clone();
        tokio::spawn(async move { queue.subscribe(handler).await })
    };

    wait_until("three adjustments", || handler.seen.lock().unwrap().len() >= 3).await;
    subscription.abort();

    let seen = handler.seen.lock().unwrap().clone();
    let product_one: Vec<_> = seen
        .iter()
        .filter(|e| e.product_id == ProductId::new(1))
        .map(|e| e.quantity_delta)
        .collect();
    assert_eq!(product_one, vec![-1, -3]);
    assert!(seen.contains(&events[1]));
}

#[tokio::test]
#[ignore]
async fn rejected_adjustment_is_redelivered_before_the_next() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = Arc::new(queue(&brokers, "redelivery", "redelivery-worker"));

    let first = StockAdjustment::consume(ProductId::new(5), 1, OrderId::new(), Utc::now());
    let second = StockAdjustment::consume(ProductId::new(5), 2, OrderId::new(), Utc::now());
    publish_when_ready(&queue, &first).await;
    queue.publish(&second).await.expect("publish");

    let handler = Arc::new(Collecting {
        reject_first: AtomicUsize::new(2),
        ..Collecting::default()
    });
    let subscription = {
        let queue = Arc::clone(&queue);
        let handler: Arc<dyn AdjustmentHandler> = handler.clone();
        tokio::spawn(async move { queue.subscribe(handler).await })
    };

    wait_until("redelivery", || handler.seen.lock().unwrap().len() >= 4).await;
    subscription.abort();

    let ids: Vec<_> = handler
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(
        ids,
        vec![first.event_id, first.event_id, first.event_id, second.event_id]
    );
}

#[tokio::test]
#[ignore]
async fn placed_orders_reach_the_ledger_through_the_broker() {
    let (_kafka, brokers) = start_kafka().await;
    let queue = Arc::new(queue(&brokers, "ledger-path", "ledger-path-worker"));

    let harness = TestHarness::new();
    let lamp = harness.seed_product(1, "Lamp", 10);
    let buyer = harness.register_member("buyer@example.com");

    // Warm the topic with a no-op adjustment for an unrelated product
    let warmup = StockAdjustment::restore(
        harness.seed_product(99, "Warmup", 0),
        1,
        ordersystem_core::AdjustmentReason::OrderRejected,
        None,
        Utc::now(),
    );
    publish_when_ready(&queue, &warmup).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = StockWorker::new(
        "redpanda-test-worker",
        Arc::clone(&queue) as Arc<dyn StockAdjustmentQueue>,
        Arc::new(harness.applier()),
        shutdown_rx,
    )
    .with_reconnect_delay(Duration::from_millis(100))
    .spawn();

    let mut env = harness.environment();
    env.queue = Arc::clone(&queue) as Arc<dyn StockAdjustmentQueue>;
    let coordinator = OrderCoordinator::new(env, ordersystem_runtime::CoordinatorConfig::default());

    let order_id = coordinator
        .create_order(&buyer, &[OrderLine::new(lamp, 4)])
        .await
        .expect("order");
    coordinator.cancel_order(order_id).await.expect("cancel");
    coordinator
        .create_order(&buyer, &[OrderLine::new(lamp, 3)])
        .await
        .expect("order");

    let ledger = harness.ledger.clone();
    wait_until("ledger to catch up", || {
        ledger.applied_count() >= 4 && ledger.stock(lamp) == Some(7)
    })
    .await;
    assert_eq!(harness.counters.value(lamp), Some(7));

    shutdown_tx.send(()).expect("shutdown");
    worker.await.expect("worker");
}
