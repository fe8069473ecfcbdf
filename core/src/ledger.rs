//! Durable product ledger: the system of record for stock.
//!
//! On the concurrent order path the ledger is written only by the stock
//! worker, one adjustment at a time. Readers (catalog lookups, reports) may lag
//! the counter store.

use futures::future::BoxFuture;

use crate::error::{CatalogError, LedgerError};
use crate::types::{Product, ProductId, StockAdjustment};

/// Result of applying one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The delta was applied; carries the new ledger stock
    Applied {
        /// Stock after the update
        stock_quantity: i64,
    },
    /// The `event_id` was already applied; nothing changed
    Duplicate,
}

/// Writable stock ledger.
pub trait ProductLedger: Send + Sync {
    /// Apply the signed delta in a transaction scoped to this single update,
    /// recording `event_id` in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Inconsistency`] if the product is missing or the delta
    ///   would make its stock negative (fatal, never retried)
    /// - [`LedgerError::Unavailable`] if the ledger cannot be reached
    fn apply_adjustment<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<ApplyOutcome, LedgerError>>;

    /// Current ledger stock of one product.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Inconsistency`] for an unknown product or
    /// [`LedgerError::Unavailable`] if the ledger cannot be reached.
    fn stock_quantity(&self, product_id: ProductId) -> BoxFuture<'_, Result<i64, LedgerError>>;

    /// Every product, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the ledger cannot be reached.
    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, LedgerError>>;
}

/// Read-only product lookup used while admitting order lines.
pub trait ProductCatalog: Send + Sync {
    /// Look a product up.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for an unknown product.
    fn find_product(&self, product_id: ProductId) -> BoxFuture<'_, Result<Product, CatalogError>>;
}

/// Durable parking place for adjustments that cannot be applied.
pub trait DeadLetterSink: Send + Sync {
    /// Park `adjustment` with the reason it failed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unavailable`] if the sink cannot be written; the
    /// caller must then request redelivery instead of acknowledging.
    fn park<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), LedgerError>>;
}
