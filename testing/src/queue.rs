//! In-memory stock adjustment queue.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::{AdjustmentHandler, QueueError, StockAdjustment, StockAdjustmentQueue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StockAdjustment>,
    published: Vec<StockAdjustment>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    arrivals: Notify,
    redelivery_delay: Duration,
    publish_failures: AtomicUsize,
    deliver_twice: AtomicBool,
    deliveries: AtomicUsize,
    acknowledged: AtomicUsize,
}

/// Single-partition FIFO queue with at-least-once delivery.
///
/// Delivery is serial: the head event is handed to the handler and only
/// removed once the handler returns `Ok`. A handler error sleeps for the
/// redelivery delay and hands over the same event again, so later events wait
/// behind it, like a Kafka partition that has not committed its offset.
///
/// Fault injection:
/// - [`fail_next_publishes`](Self::fail_next_publishes) rejects publishes
/// - [`deliver_twice`](Self::deliver_twice) delivers every event twice before
///   acknowledging it, simulating a redelivery after a lost commit
///
/// Clones share state.
#[derive(Clone, Debug)]
pub struct InMemoryStockQueue {
    shared: Arc<Shared>,
}

impl Default for InMemoryStockQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStockQueue {
    /// Create an open queue with a 10ms redelivery delay.
    #[must_use]
    pub fn new() -> Self {
        Self::with_redelivery_delay(Duration::from_millis(10))
    }

    /// Create an open queue with a custom redelivery delay.
    #[must_use]
    pub fn with_redelivery_delay(redelivery_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                arrivals: Notify::new(),
                redelivery_delay,
                publish_failures: AtomicUsize::new(0),
                deliver_twice: AtomicBool::new(false),
                deliveries: AtomicUsize::new(0),
                acknowledged: AtomicUsize::new(0),
            }),
        }
    }

    /// Reject the next `count` publishes with `PublishFailed`.
    pub fn fail_next_publishes(&self, count: usize) {
        self.shared
            .publish_failures
            .store(count, AtomicOrdering::SeqCst);
    }

    /// Deliver every event twice before acknowledging it.
    pub fn deliver_twice(&self, enabled: bool) {
        self.shared
            .deliver_twice
            .store(enabled, AtomicOrdering::SeqCst);
    }

    /// Close the queue: subscriptions return once the backlog is drained.
    pub fn close(&self) {
        self.shared.state.lock().unwrap().closed = true;
        self.shared.arrivals.notify_waiters();
        self.shared.arrivals.notify_one();
    }

    /// Every successfully published event, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<StockAdjustment> {
        self.shared.state.lock().unwrap().published.clone()
    }

    /// Number of events not yet acknowledged.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().unwrap().pending.len()
    }

    /// Number of handler invocations so far (including redeliveries).
    #[must_use]
    pub fn delivery_count(&self) -> usize {
        self.shared.deliveries.load(AtomicOrdering::SeqCst)
    }

    /// Number of acknowledged events.
    #[must_use]
    pub fn acknowledged_count(&self) -> usize {
        self.shared.acknowledged.load(AtomicOrdering::SeqCst)
    }

    /// Deliver the current backlog to `handler` and return once it is empty.
    ///
    /// Returns the number of acknowledged events.
    pub async fn run_until_idle(&self, handler: &dyn AdjustmentHandler) -> usize {
        let mut acknowledged = 0;
        while let Some(event) = self.head() {
            self.deliver(handler, &event).await;
            acknowledged += 1;
        }
        acknowledged
    }

    fn head(&self) -> Option<StockAdjustment> {
        self.shared.state.lock().unwrap().pending.front().cloned()
    }

    /// Deliver one event until the handler accepts it, then acknowledge it.
    async fn deliver(&self, handler: &dyn AdjustmentHandler, event: &StockAdjustment) {
        let attempts = if self.shared.deliver_twice.load(AtomicOrdering::SeqCst) {
            2
        } else {
            1
        };
        for _ in 0..attempts {
            loop {
                self.shared.deliveries.fetch_add(1, AtomicOrdering::SeqCst);
                match handler.handle(event).await {
                    Ok(()) => break,
                    Err(_) => tokio::time::sleep(self.shared.redelivery_delay).await,
                }
            }
        }
        let mut state = self.shared.state.lock().unwrap();
        if state
            .pending
            .front()
            .is_some_and(|head| head.event_id == event.event_id)
        {
            state.pending.pop_front();
        }
        drop(state);
        self.shared.acknowledged.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

impl StockAdjustmentQueue for InMemoryStockQueue {
    fn publish<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let injected = self
                .shared
                .publish_failures
                .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                    n.checked_sub(1)
                })
                .is_ok();
            if injected {
                return Err(QueueError::PublishFailed {
                    product_id: adjustment.product_id,
                    reason: "injected failure".to_string(),
                });
            }

            let mut state = self.shared.state.lock().unwrap();
            if state.closed {
                return Err(QueueError::Transport("queue closed".to_string()));
            }
            state.pending.push_back(adjustment.clone());
            state.published.push(adjustment.clone());
            drop(state);
            self.shared.arrivals.notify_one();
            Ok(())
        })
    }

    fn subscribe(
        &self,
        handler: Arc<dyn AdjustmentHandler>,
    ) -> BoxFuture<'_, Result<(), QueueError>> {
        Box::pin(async move {
            loop {
                let next = {
                    let state = self.shared.state.lock().unwrap();
                    match state.pending.front() {
                        Some(event) => Some(event.clone()),
                        None if state.closed => return Ok(()),
                        None => None,
                    }
                };
                match next {
                    Some(event) => self.deliver(handler.as_ref(), &event).await,
                    None => self.shared.arrivals.notified().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersystem_core::{HandlerError, OrderId, ProductId};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Collecting {
        seen: StdMutex<Vec<i64>>,
        fail_first: AtomicBool,
    }

    impl AdjustmentHandler for Collecting {
        fn handle<'a>(
            &'a self,
            adjustment: &'a StockAdjustment,
        ) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async move {
                self.seen
                    .lock()
                    .unwrap()
                    .push(adjustment.product_id.get());
                if self.fail_first.swap(false, AtomicOrdering::SeqCst) {
                    return Err(HandlerError("try again".to_string()));
                }
                Ok(())
            })
        }
    }

    fn event(product: i64) -> StockAdjustment {
        StockAdjustment::consume(
            ProductId::new(product),
            1,
            OrderId::new(),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn failed_delivery_is_redelivered_before_later_events() {
        let queue = InMemoryStockQueue::with_redelivery_delay(Duration::from_millis(1));
        queue.publish(&event(1)).await.unwrap();
        queue.publish(&event(2)).await.unwrap();

        let handler = Collecting {
            fail_first: AtomicBool::new(true),
            ..Collecting::default()
        };
        assert_eq!(queue.run_until_idle(&handler).await, 2);
        assert_eq!(*handler.seen.lock().unwrap(), vec![1, 1, 2]);
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn subscription_ends_when_closed_and_drained() {
        let queue = InMemoryStockQueue::new();
        queue.publish(&event(3)).await.unwrap();
        queue.close();

        let handler = Arc::new(Collecting::default());
        queue.subscribe(handler.clone()).await.unwrap();
        assert_eq!(*handler.seen.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn injected_publish_failure_keeps_event_out() {
        let queue = InMemoryStockQueue::new();
        queue.fail_next_publishes(1);

        assert!(queue.publish(&event(1)).await.is_err());
        assert!(queue.published().is_empty());
        assert!(queue.publish(&event(1)).await.is_ok());
        assert_eq!(queue.published().len(), 1);
    }
}
