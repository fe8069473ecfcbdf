//! Integration tests for the Redis backends using testcontainers.
//!
//! Docker must be running:
//!
//! ```bash
//! cargo test -p ordersystem-redis -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use futures::StreamExt;
use ordersystem_core::environment::Clock;
use ordersystem_core::{
    AdminNotification, AdminNotifier, CounterError, CounterStore, OrderId, ProductId,
};
use ordersystem_redis::{RedisAlarmPublisher, RedisCounterStore};
use ordersystem_testing::test_clock;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn setup_redis() -> (ContainerAsync<Redis>, String) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    (container, format!("redis://127.0.0.1:{port}"))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_decrement_and_compensate() {
    let (_container, url) = setup_redis().await;
    let counters = RedisCounterStore::new(&url).await.unwrap();
    let product = ProductId::new(1);

    counters.set(product, 5).await.unwrap();
    assert_eq!(counters.decrement(product, 3).await.unwrap(), 2);

    // Losing decrement goes negative and is compensated by the caller
    assert_eq!(counters.decrement(product, 3).await.unwrap(), -1);
    assert_eq!(counters.increment(product, 3).await.unwrap(), 2);

    assert_eq!(counters.get(product).await.unwrap(), Some(2));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_set_if_absent_keeps_live_counter() {
    let (_container, url) = setup_redis().await;
    let counters = RedisCounterStore::new(&url).await.unwrap();
    let product = ProductId::new(3);

    assert!(counters.set_if_absent(product, 10).await.unwrap());
    assert_eq!(counters.decrement(product, 6).await.unwrap(), 4);

    assert!(!counters.set_if_absent(product, 10).await.unwrap());
    assert_eq!(counters.get(product).await.unwrap(), Some(4));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unseeded_counter_is_not_created() {
    let (_container, url) = setup_redis().await;
    let counters = RedisCounterStore::new(&url).await.unwrap();
    let product = ProductId::new(404);

    assert_eq!(
        counters.decrement(product, 1).await.unwrap_err(),
        CounterError::NotFound(product)
    );
    assert_eq!(counters.get(product).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires Docker"]
async fn test_concurrent_decrements_never_oversell() {
    let (_container, url) = setup_redis().await;
    let counters = RedisCounterStore::new(&url).await.unwrap();
    let product = ProductId::new(7);
    counters.set(product, 10).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..25 {
        let counters = counters.clone();
        tasks.push(tokio::spawn(async move {
            let remaining = counters.decrement(product, 1).await.unwrap();
            if remaining < 0 {
                counters.increment(product, 1).await.unwrap();
                false
            } else {
                true
            }
        }));
    }

    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(counters.get(product).await.unwrap(), Some(0));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_alarm_reaches_recipient_channel() {
    let (_container, url) = setup_redis().await;
    let recipient = "admin@ordersystem.local";

    let client = redis::Client::open(url.as_str()).unwrap();
    let mut pubsub = client.get_async_pubsub().await.unwrap();
    pubsub
        .subscribe(RedisAlarmPublisher::channel(recipient))
        .await
        .unwrap();

    let publisher = RedisAlarmPublisher::new(&url).await.unwrap();
    let notification = AdminNotification {
        recipient: recipient.to_string(),
        actor: "buyer@example.com".to_string(),
        order_id: OrderId::new(),
        sent_at: test_clock().now(),
    };
    publisher.publish(&notification).await.unwrap();

    let message = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        pubsub.on_message().next(),
    )
    .await
    .expect("alarm not received in time")
    .expect("subscription closed");

    let payload: String = message.get_payload().unwrap();
    let received: AdminNotification = serde_json::from_str(&payload).unwrap();
    assert_eq!(received, notification);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_alarm_without_subscribers_succeeds() {
    let (_container, url) = setup_redis().await;
    let publisher = RedisAlarmPublisher::new(&url).await.unwrap();

    let notification = AdminNotification {
        recipient: "nobody@ordersystem.local".to_string(),
        actor: "buyer@example.com".to_string(),
        order_id: OrderId::new(),
        sent_at: test_clock().now(),
    };
    assert!(publisher.publish(&notification).await.is_ok());
}
