//! Redpanda stock adjustment queue for the order system.
//!
//! Implements [`StockAdjustmentQueue`] on a Kafka-compatible topic through
//! rdkafka.
//!
//! # Partitioning
//!
//! ```text
//! OrderCoordinator ──publish──► stock-adjustments topic
//!                               key = product id
//!                               ├─ partition 0: product 1, 4, ...
//!                               ├─ partition 1: product 2, 5, ...
//!                               └─ partition 2: product 3, 6, ...
//!                                        │
//!                                        ▼
//!                              StockWorker (one consumer group)
//! ```
//!
//! Every adjustment for one product lands on the same partition, so the
//! worker sees them in publish order.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - The offset is committed only after the handler returns `Ok`
//! - A handler error redelivers the same message after `redelivery_delay`;
//!   later messages of the partition wait behind it
//! - After `max_redeliveries` in-place attempts the consumer seeks back to
//!   the uncommitted message and returns to polling, so a long handler
//!   outage never holds the poll loop past `max.poll.interval.ms`
//! - A crash before commit redelivers from the last committed offset, so the
//!   handler must be idempotent (the ledger deduplicates by `event_id`)
//! - A payload that cannot be decoded is logged at error level and committed;
//!   redelivering it could never succeed
//!
//! # Example
//!
//! ```no_run
//! use ordersystem_redpanda::RedpandaStockQueue;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RedpandaStockQueue::builder()
//!     .brokers("localhost:9092")
//!     .topic("stock-adjustments")
//!     .consumer_group("stock-worker")
//!     .producer_acks("all")
//!     .redelivery_delay(Duration::from_millis(500))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use ordersystem_core::{AdjustmentHandler, QueueError, StockAdjustment, StockAdjustmentQueue};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;

/// Default topic for stock adjustments.
pub const DEFAULT_TOPIC: &str = "stock-adjustments";

/// Default consumer group of the stock worker.
pub const DEFAULT_CONSUMER_GROUP: &str = "ordersystem-stock-worker";

/// Encode an adjustment as a JSON message payload.
///
/// # Errors
///
/// Returns [`QueueError::Serialization`] if encoding fails.
pub fn encode(adjustment: &StockAdjustment) -> Result<Vec<u8>, QueueError> {
    serde_json::to_vec(adjustment).map_err(|e| QueueError::Serialization(e.to_string()))
}

/// Decode a JSON message payload.
///
/// # Errors
///
/// Returns [`QueueError::Serialization`] for malformed payloads.
pub fn decode(payload: &[u8]) -> Result<StockAdjustment, QueueError> {
    serde_json::from_slice(payload).map_err(|e| QueueError::Serialization(e.to_string()))
}

/// Stock adjustment queue on Redpanda (or any Kafka-compatible broker).
///
/// Cheap to share behind an `Arc`: the producer is internally pooled and each
/// [`subscribe`](StockAdjustmentQueue::subscribe) call creates its own
/// consumer.
pub struct RedpandaStockQueue {
    producer: FutureProducer,
    brokers: String,
    topic: String,
    timeout: Duration,
    consumer_group: String,
    auto_offset_reset: String,
    redelivery_delay: Duration,
    max_redeliveries: u32,
}

impl RedpandaStockQueue {
    /// Create a queue on the default topic with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, QueueError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for configuring the queue.
    #[must_use]
    pub fn builder() -> RedpandaStockQueueBuilder {
        RedpandaStockQueueBuilder::default()
    }

    /// Broker addresses.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Topic adjustments are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn consumer(&self) -> Result<StreamConsumer, QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| QueueError::SubscriptionFailed(format!("Failed to create consumer: {e}")))?;

        consumer.subscribe(&[self.topic.as_str()]).map_err(|e| {
            QueueError::SubscriptionFailed(format!("Failed to subscribe to {}: {e}", self.topic))
        })?;
        Ok(consumer)
    }

    /// Hand one adjustment to the handler, redelivering in place up to
    /// `max_redeliveries` times. `false` if it was never accepted.
    async fn deliver(&self, handler: &dyn AdjustmentHandler, adjustment: &StockAdjustment) -> bool {
        let mut attempt: u32 = 0;
        loop {
            match handler.handle(adjustment).await {
                Ok(()) => return true,
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        event_id = %adjustment.event_id,
                        product_id = %adjustment.product_id,
                        attempt,
                        error = %e,
                        "Handler rejected adjustment, redelivering"
                    );
                    if attempt > self.max_redeliveries {
                        return false;
                    }
                    tokio::time::sleep(self.redelivery_delay).await;
                }
            }
        }
    }
}

/// Commit `offset + 1` for one partition.
fn commit(
    consumer: &StreamConsumer,
    topic: &str,
    partition: i32,
    offset: i64,
) -> Result<(), QueueError> {
    let mut assignment = TopicPartitionList::new();
    assignment
        .add_partition_offset(topic, partition, Offset::Offset(offset + 1))
        .map_err(|e| QueueError::Transport(e.to_string()))?;
    consumer
        .commit(&assignment, CommitMode::Async)
        .map_err(|e| QueueError::Transport(e.to_string()))
}

/// Builder for configuring a [`RedpandaStockQueue`].
#[derive(Default)]
pub struct RedpandaStockQueueBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    redelivery_delay: Option<Duration>,
    max_redeliveries: Option<u32>,
}

impl RedpandaStockQueueBuilder {
    /// Comma-separated broker addresses (e.g., "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Topic name. Default: [`DEFAULT_TOPIC`]
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Producer acknowledgment mode: "0", "1", or "all". Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group ID. Default: [`DEFAULT_CONSUMER_GROUP`]
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Where a new consumer group starts reading. Default: "earliest"
    ///
    /// A fresh stock worker must not skip adjustments published before it
    /// first joined.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Pause before redelivering a rejected message. Default: 1 second
    #[must_use]
    pub const fn redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = Some(delay);
        self
    }

    /// In-place redeliveries before the consumer goes back to polling and
    /// fetches the message again. Default: 5
    #[must_use]
    pub const fn max_redeliveries(mut self, max: u32) -> Self {
        self.max_redeliveries = Some(max);
        self
    }

    /// Build the [`RedpandaStockQueue`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if brokers are not set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaStockQueue, QueueError> {
        let brokers = self
            .brokers
            .ok_or_else(|| QueueError::Transport("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("enable.idempotence", if acks == "all" { "true" } else { "false" })
            .create()
            .map_err(|e| QueueError::Transport(format!("Failed to create producer: {e}")))?;

        let queue = RedpandaStockQueue {
            producer,
            brokers,
            topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            timeout,
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
            redelivery_delay: self.redelivery_delay.unwrap_or(Duration::from_secs(1)),
            max_redeliveries: self.max_redeliveries.unwrap_or(5),
        };

        tracing::info!(
            brokers = %queue.brokers,
            topic = %queue.topic,
            acks = %acks,
            consumer_group = %queue.consumer_group,
            auto_offset_reset = %queue.auto_offset_reset,
            "RedpandaStockQueue created"
        );
        Ok(queue)
    }
}

impl StockAdjustmentQueue for RedpandaStockQueue {
    fn publish<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let payload = encode(adjustment)?;
            let key = adjustment.partition_key();
            let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition,
                        offset,
                        event_id = %adjustment.event_id,
                        product_id = %adjustment.product_id,
                        "Adjustment published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        event_id = %adjustment.event_id,
                        error = %kafka_error,
                        "Failed to publish adjustment"
                    );
                    Err(QueueError::PublishFailed {
                        product_id: adjustment.product_id,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        handler: Arc<dyn AdjustmentHandler>,
    ) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            let consumer = self.consumer()?;
            tracing::info!(
                topic = %self.topic,
                consumer_group = %self.consumer_group,
                manual_commit = true,
                "Subscribed to stock adjustments"
            );

            loop {
                let (partition, offset, decoded) = {
                    let message = consumer
                        .recv()
                        .await
                        .map_err(|e| QueueError::Transport(format!("Failed to receive: {e}")))?;
                    let decoded = message
                        .payload()
                        .ok_or_else(|| QueueError::Serialization("Message has no payload".to_string()))
                        .and_then(decode);
                    (message.partition(), message.offset(), decoded)
                };

                match decoded {
                    Ok(adjustment) => {
                        tracing::trace!(
                            partition,
                            offset,
                            event_id = %adjustment.event_id,
                            "Received adjustment"
                        );
                        if !self.deliver(handler.as_ref(), &adjustment).await {
                            // Left uncommitted; fetched again on the next poll
                            consumer
                                .seek(&self.topic, partition, Offset::Offset(offset), self.timeout)
                                .map_err(|e| {
                                    QueueError::Transport(format!(
                                        "Failed to seek back to offset {offset}: {e}"
                                    ))
                                })?;
                            tracing::warn!(
                                partition,
                                offset,
                                event_id = %adjustment.event_id,
                                "Adjustment still rejected, returning to poll"
                            );
                            continue;
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            alert = true,
                            topic = %self.topic,
                            partition,
                            offset,
                            error = %e,
                            "Undecodable adjustment skipped"
                        );
                    }
                }

                if let Err(e) = commit(&consumer, &self.topic, partition, offset) {
                    tracing::warn!(
                        partition,
                        offset,
                        error = %e,
                        "Failed to commit offset (message may be redelivered)"
                    );
                }
            }
        })
    }
}
