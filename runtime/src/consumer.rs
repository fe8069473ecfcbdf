//! Stock worker: the single consumer that applies adjustments to the ledger.
//!
//! # Subscribe-Apply-Reconnect Loop
//!
//! ```text
//! loop {
//!     select {
//!         shutdown         => stop
//!         queue.subscribe  => LedgerApplier.handle(event) per delivery
//!     }
//!     subscription ended or failed: wait reconnect_delay, resubscribe
//! }
//! ```
//!
//! # Failure handling in [`LedgerApplier`]
//!
//! | Ledger result                | Handler result | Transport action      |
//! |------------------------------|----------------|-----------------------|
//! | `Applied`                    | `Ok`           | commit                |
//! | `Duplicate`                  | `Ok`           | commit                |
//! | `Inconsistency`, parked      | `Ok`           | commit                |
//! | `Inconsistency`, park failed | `Err`          | redeliver             |
//! | `Unavailable`                | `Err`          | redeliver             |

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use ordersystem_core::ledger::ApplyOutcome;
use ordersystem_core::{
    AdjustmentHandler, DeadLetterSink, HandlerError, LedgerError, ProductLedger, StockAdjustment,
    StockAdjustmentQueue,
};

use crate::metrics::StockMetrics;

/// Applies each delivered adjustment to the product ledger.
///
/// Redelivery-safe: the ledger skips event IDs it has already applied.
pub struct LedgerApplier {
    ledger: Arc<dyn ProductLedger>,
    dead_letters: Arc<dyn DeadLetterSink>,
}

impl LedgerApplier {
    /// Create an applier writing to `ledger` and parking poison events in
    /// `dead_letters`.
    #[must_use]
    pub fn new(ledger: Arc<dyn ProductLedger>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            ledger,
            dead_letters,
        }
    }

    async fn apply(&self, adjustment: &StockAdjustment) -> Result<(), HandlerError> {
        match self.ledger.apply_adjustment(adjustment).await {
            Ok(ApplyOutcome::Applied { stock_quantity }) => {
                StockMetrics::record_applied();
                debug!(
                    event_id = %adjustment.event_id,
                    product_id = %adjustment.product_id,
                    delta = adjustment.quantity_delta,
                    stock_quantity,
                    "Adjustment applied"
                );
                Ok(())
            }
            Ok(ApplyOutcome::Duplicate) => {
                StockMetrics::record_duplicate();
                info!(
                    event_id = %adjustment.event_id,
                    product_id = %adjustment.product_id,
                    "Duplicate adjustment skipped"
                );
                Ok(())
            }
            Err(LedgerError::Inconsistency { product_id, reason }) => {
                error!(
                    alert = true,
                    event_id = %adjustment.event_id,
                    product_id = %product_id,
                    delta = adjustment.quantity_delta,
                    reason = %reason,
                    "Ledger inconsistency, parking adjustment"
                );
                self.dead_letters
                    .park(adjustment, &reason)
                    .await
                    .inspect_err(|e| {
                        StockMetrics::record_failed();
                        error!(
                            event_id = %adjustment.event_id,
                            error = %e,
                            "Dead-letter sink unavailable, requesting redelivery"
                        );
                    })?;
                StockMetrics::record_dead_lettered();
                Ok(())
            }
            Err(e @ LedgerError::Unavailable(_)) => {
                StockMetrics::record_failed();
                warn!(
                    event_id = %adjustment.event_id,
                    product_id = %adjustment.product_id,
                    error = %e,
                    "Ledger unavailable, requesting redelivery"
                );
                Err(e.into())
            }
        }
    }
}

impl AdjustmentHandler for LedgerApplier {
    fn handle<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(self.apply(adjustment))
    }
}

/// Background task that owns the queue subscription.
///
/// Runs until a shutdown signal is received. A subscription that ends or
/// fails is re-established after `reconnect_delay`.
pub struct StockWorker {
    name: String,
    queue: Arc<dyn StockAdjustmentQueue>,
    handler: Arc<dyn AdjustmentHandler>,
    shutdown: broadcast::Receiver<()>,
    reconnect_delay: Duration,
}

impl StockWorker {
    /// Create a worker with a 5 second reconnect delay.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn StockAdjustmentQueue>,
        handler: Arc<dyn AdjustmentHandler>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            handler,
            shutdown,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    /// Set a custom reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawn the worker as a background task.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(worker = %self.name, "Stock worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(worker = %self.name, "Stock worker received shutdown signal");
                    break;
                }
                result = self.queue.subscribe(Arc::clone(&self.handler)) => {
                    match result {
                        Ok(()) => warn!(
                            worker = %self.name,
                            delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                            "Subscription ended, reconnecting"
                        ),
                        Err(e) => error!(
                            worker = %self.name,
                            error = %e,
                            delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                            "Subscription failed, reconnecting"
                        ),
                    }
                    StockMetrics::record_reconnect();
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(worker = %self.name, "Stock worker received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(worker = %self.name, "Stock worker stopped");
    }
}
