//! Counter seeding from the ledger.

use ordersystem_core::{CounterError, CounterStore, LedgerError, ProductLedger};
use thiserror::Error;

/// Errors from [`seed_counters`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    /// Products could not be listed
    #[error("Cannot read ledger: {0}")]
    Ledger(#[from] LedgerError),
    /// A counter could not be written
    #[error("Cannot write counter: {0}")]
    Counter(#[from] CounterError),
}

/// Copy ledger stock into every counter that does not exist yet.
///
/// Existing counters are kept. They already account for decrements that
/// are admitted but still waiting in the stock adjustment queue, while the
/// ledger does not, so overwriting them on a restart would oversell. Use
/// [`CounterStore::set`] to reset a counter explicitly once the queue is
/// drained.
///
/// Returns the number of counters written.
///
/// # Errors
///
/// Returns [`SeedError`] on the first ledger or counter failure.
pub async fn seed_counters(
    ledger: &dyn ProductLedger,
    counters: &dyn CounterStore,
) -> Result<usize, SeedError> {
    let products = ledger.list_products().await?;
    let mut seeded = 0;
    for product in &products {
        if counters
            .set_if_absent(product.id, product.stock_quantity)
            .await?
        {
            seeded += 1;
            tracing::debug!(
                product_id = %product.id,
                stock_quantity = product.stock_quantity,
                "Counter seeded"
            );
        } else {
            tracing::debug!(product_id = %product.id, "Counter already live, kept");
        }
    }
    tracing::info!(
        products = products.len(),
        seeded,
        "Stock counters seeded from ledger"
    );
    Ok(seeded)
}
