//! Prometheus metrics for the order path and the stock worker.
//!
//! # Example
//!
//! ```rust,no_run
//! use ordersystem_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP exporter.
    ///
    /// Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built (for
    /// example the address cannot be bound) and [`MetricsError::Install`] if a
    /// global recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the server hasn't been started.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Order coordinator
    describe_counter!("orders_created_total", "Orders persisted by the concurrent path");
    describe_counter!(
        "orders_rejected_total",
        "Order requests that failed, by reason"
    );
    describe_counter!("orders_canceled_total", "Orders moved to CANCELED");
    describe_counter!(
        "stock_compensations_total",
        "Counter increments issued to undo a speculative decrement"
    );
    describe_counter!(
        "stock_compensation_failures_total",
        "Compensating increments or reversal events that could not be applied"
    );
    describe_counter!(
        "admin_notifications_failed_total",
        "Admin notifications that could not be published"
    );
    describe_histogram!(
        "order_create_duration_seconds",
        "Time taken to admit and persist an order"
    );

    // Stock worker
    describe_counter!(
        "stock_adjustments_applied_total",
        "Adjustments applied to the product ledger"
    );
    describe_counter!(
        "stock_adjustments_duplicate_total",
        "Redelivered adjustments skipped by event id"
    );
    describe_counter!(
        "stock_adjustments_dead_lettered_total",
        "Adjustments parked for operator intervention"
    );
    describe_counter!(
        "stock_adjustments_failed_total",
        "Adjustment deliveries that will be redelivered"
    );
    describe_counter!(
        "stock_worker_reconnects_total",
        "Times the stock worker re-established its subscription"
    );
}

/// Order coordinator metrics recorder.
pub struct OrderMetrics;

impl OrderMetrics {
    /// Record a persisted order.
    pub fn record_created(duration: Duration) {
        counter!("orders_created_total").increment(1);
        histogram!("order_create_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed order request.
    pub fn record_rejected(reason: &'static str) {
        counter!("orders_rejected_total", "reason" => reason).increment(1);
    }

    /// Record a cancellation.
    pub fn record_canceled() {
        counter!("orders_canceled_total").increment(1);
    }

    /// Record compensating increments.
    pub fn record_compensations(count: u64) {
        counter!("stock_compensations_total").increment(count);
    }

    /// Record a compensation step that failed.
    pub fn record_compensation_failure() {
        counter!("stock_compensation_failures_total").increment(1);
    }

    /// Record an admin notification that was not delivered.
    pub fn record_notification_failure() {
        counter!("admin_notifications_failed_total").increment(1);
    }
}

/// Stock worker metrics recorder.
pub struct StockMetrics;

impl StockMetrics {
    /// Record an applied adjustment.
    pub fn record_applied() {
        counter!("stock_adjustments_applied_total").increment(1);
    }

    /// Record a duplicate delivery.
    pub fn record_duplicate() {
        counter!("stock_adjustments_duplicate_total").increment(1);
    }

    /// Record a dead-lettered adjustment.
    pub fn record_dead_lettered() {
        counter!("stock_adjustments_dead_lettered_total").increment(1);
    }

    /// Record a delivery that failed and will be redelivered.
    pub fn record_failed() {
        counter!("stock_adjustments_failed_total").increment(1);
    }

    /// Record a subscription restart.
    pub fn record_reconnect() {
        counter!("stock_worker_reconnects_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_work_without_installed_exporter() {
        // The metrics facade is a no-op until a recorder is installed
        OrderMetrics::record_created(Duration::from_millis(3));
        OrderMetrics::record_rejected("insufficient_stock");
        StockMetrics::record_applied();
        StockMetrics::record_dead_lettered();
    }

    #[test]
    fn unstarted_server_renders_nothing() {
        let server = MetricsServer::new(([127, 0, 0, 1], 0).into());
        assert!(server.render().is_none());
    }
}
