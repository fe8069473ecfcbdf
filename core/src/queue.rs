//! Stock adjustment queue abstraction.
//!
//! The queue carries [`StockAdjustment`] events from the order coordinator to
//! the single stock worker that applies them to the ledger.
//!
//! # Delivery guarantees
//!
//! - **At-least-once**: an event is acknowledged only after the handler
//!   returns `Ok`; a handler error causes redelivery of the same event
//! - **Ordered per product**: events for one product are delivered in publish
//!   order, and a failing event blocks the later events of its partition
//! - **Single consumer**: one handler invocation at a time per partition
//!
//! Handlers must therefore be idempotent. The ledger achieves this by
//! recording every applied `event_id`.
//!
//! # Implementations
//!
//! - `RedpandaStockQueue` (`ordersystem-redpanda`): Kafka-compatible, keyed by
//!   product ID
//! - `InMemoryStockQueue` (`ordersystem-testing`): FIFO with fault injection

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::{HandlerError, QueueError};
use crate::types::StockAdjustment;

/// Processes one delivered adjustment.
pub trait AdjustmentHandler: Send + Sync {
    /// Handle a delivery. `Err` requests redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the event must be delivered again.
    fn handle<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), HandlerError>>;
}

/// Durable, ordered, at-least-once channel of stock adjustments.
pub trait StockAdjustmentQueue: Send + Sync {
    /// Publish one adjustment. Republishing the same event (same `event_id`)
    /// is safe.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::PublishFailed`] or [`QueueError::Transport`] if
    /// the event could not be durably accepted.
    fn publish<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Run the consume loop, delivering events to `handler` one at a time.
    ///
    /// Resolves `Ok(())` when the transport closes the subscription, or with an
    /// error if it fails. Dropping the future stops consumption; unacknowledged
    /// events are redelivered to the next subscription.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SubscriptionFailed`] or [`QueueError::Transport`]
    /// when the subscription cannot be established or breaks.
    fn subscribe(
        &self,
        handler: Arc<dyn AdjustmentHandler>,
    ) -> BoxFuture<'_, Result<(), QueueError>>;
}
