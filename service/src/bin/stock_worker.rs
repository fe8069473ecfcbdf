//! Stock worker process.
//!
//! This binary:
//! - Connects `PostgreSQL` (running migrations), Redis, and Redpanda
//! - Seeds missing stock counters from the product ledger
//! - Applies stock adjustments to the ledger until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run the worker
//! cargo run --bin stock-worker
//! ```

use ordersystem_runtime::metrics::MetricsServer;
use ordersystem_service::{Config, Resources};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn,rdkafka=warn", config.server.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        postgres = %config.postgres.url,
        redpanda = %config.redpanda.brokers,
        topic = %config.redpanda.stock_topic,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;

    let resources = Resources::from_config(&config).await?;

    // Only missing counters are written; live ones may carry admitted
    // decrements the worker has not applied yet
    let seeded = resources.seed_counters().await?;
    info!(products = seeded, "Stock counters seeded");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = resources.stock_worker(shutdown_rx).spawn();
    info!("Stock worker running");

    shutdown_signal().await?;

    info!("Shutting down...");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(config.shutdown_timeout(), worker).await {
        Ok(Ok(())) => info!("Stock worker stopped gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Stock worker task failed"),
        Err(_) => warn!("Stock worker shutdown timed out"),
    }

    info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C signal");
            }
            _ = terminate.recv() => info!("Received SIGTERM signal"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C signal");
        Ok(())
    }
}
