//! In-memory product ledger and dead-letter sink.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::ledger::ApplyOutcome;
use ordersystem_core::{
    CatalogError, DeadLetterSink, LedgerError, Product, ProductCatalog, ProductId, ProductLedger,
    StockAdjustment,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    products: BTreeMap<ProductId, Product>,
    applied: HashSet<Uuid>,
    applications: usize,
}

/// Product ledger and catalog held in a `BTreeMap`.
///
/// Applied event IDs are recorded under the same lock as the stock update,
/// mirroring the single-transaction apply of the PostgreSQL ledger.
/// [`without_deduplication`](Self::without_deduplication) turns that off to
/// show what redelivery does to a ledger that cannot recognize repeats.
///
/// Clones share state.
#[derive(Clone, Debug)]
pub struct InMemoryProductLedger {
    state: Arc<RwLock<LedgerState>>,
    deduplicate: bool,
    failures_remaining: Arc<AtomicUsize>,
}

impl Default for InMemoryProductLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProductLedger {
    /// Create an empty ledger that deduplicates by event ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            deduplicate: true,
            failures_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an empty ledger that applies every delivery.
    #[must_use]
    pub fn without_deduplication() -> Self {
        Self {
            deduplicate: false,
            ..Self::new()
        }
    }

    /// Insert or replace a product.
    pub fn insert_product(&self, product: Product) {
        self.state
            .write()
            .unwrap()
            .products
            .insert(product.id, product);
    }

    /// Current stock, `None` for unknown products.
    #[must_use]
    pub fn stock(&self, product_id: ProductId) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&product_id)
            .map(|product| product.stock_quantity)
    }

    /// Overwrite stock directly (naive placement path only).
    pub(crate) fn write_stock(&self, product_id: ProductId, stock_quantity: i64) {
        if let Some(product) = self.state.write().unwrap().products.get_mut(&product_id) {
            product.stock_quantity = stock_quantity;
        }
    }

    /// Number of adjustments that changed stock.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.state.read().unwrap().applications
    }

    /// Fail the next `count` calls with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining
            .store(count, AtomicOrdering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }

    fn apply(&self, adjustment: &StockAdjustment) -> Result<ApplyOutcome, LedgerError> {
        let mut state = self.state.write().unwrap();
        if self.deduplicate && state.applied.contains(&adjustment.event_id) {
            return Ok(ApplyOutcome::Duplicate);
        }

        let product = state.products.get_mut(&adjustment.product_id).ok_or_else(|| {
            LedgerError::Inconsistency {
                product_id: adjustment.product_id,
                reason: "product does not exist".to_string(),
            }
        })?;
        let stock_quantity = product.stock_quantity + adjustment.quantity_delta;
        if stock_quantity < 0 {
            return Err(LedgerError::Inconsistency {
                product_id: adjustment.product_id,
                reason: format!(
                    "delta {} would leave stock at {stock_quantity}",
                    adjustment.quantity_delta
                ),
            });
        }
        product.stock_quantity = stock_quantity;

        state.applied.insert(adjustment.event_id);
        state.applications += 1;
        Ok(ApplyOutcome::Applied { stock_quantity })
    }
}

impl ProductLedger for InMemoryProductLedger {
    fn apply_adjustment<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
    ) -> BoxFuture<'a, Result<ApplyOutcome, LedgerError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(LedgerError::Unavailable("injected failure".to_string()));
            }
            self.apply(adjustment)
        })
    }

    fn stock_quantity(&self, product_id: ProductId) -> BoxFuture<'_, Result<i64, LedgerError>> {
        Box::pin(async move {
            self.stock(product_id)
                .ok_or_else(|| LedgerError::Inconsistency {
                    product_id,
                    reason: "product does not exist".to_string(),
                })
        })
    }

    fn list_products(&self) -> BoxFuture<'_, Result<Vec<Product>, LedgerError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(LedgerError::Unavailable("injected failure".to_string()));
            }
            Ok(self.state.read().unwrap().products.values().cloned().collect())
        })
    }
}

impl ProductCatalog for InMemoryProductLedger {
    fn find_product(&self, product_id: ProductId) -> BoxFuture<'_, Result<Product, CatalogError>> {
        Box::pin(async move {
            self.state
                .read()
                .unwrap()
                .products
                .get(&product_id)
                .cloned()
                .ok_or(CatalogError::NotFound(product_id))
        })
    }
}

/// Dead-letter sink that keeps parked events in memory.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDeadLetterSink {
    parked: Arc<RwLock<Vec<(StockAdjustment, String)>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryDeadLetterSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `park` fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    /// Parked events with their failure reasons.
    #[must_use]
    pub fn parked(&self) -> Vec<(StockAdjustment, String)> {
        self.parked.read().unwrap().clone()
    }
}

impl DeadLetterSink for InMemoryDeadLetterSink {
    fn park<'a>(
        &'a self,
        adjustment: &'a StockAdjustment,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            if self.failing.load(AtomicOrdering::SeqCst) {
                return Err(LedgerError::Unavailable("dead-letter sink down".to_string()));
            }
            self.parked
                .write()
                .unwrap()
                .push((adjustment.clone(), reason.to_string()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersystem_core::OrderId;

    fn keyboard(stock_quantity: i64) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Keyboard".to_string(),
            category: None,
            stock_quantity,
        }
    }

    #[tokio::test]
    async fn repeated_event_is_applied_once() {
        let ledger = InMemoryProductLedger::new();
        ledger.insert_product(keyboard(10));
        let event =
            StockAdjustment::consume(ProductId::new(1), 4, OrderId::new(), chrono::Utc::now());

        assert_eq!(
            ledger.apply_adjustment(&event).await,
            Ok(ApplyOutcome::Applied { stock_quantity: 6 })
        );
        assert_eq!(
            ledger.apply_adjustment(&event).await,
            Ok(ApplyOutcome::Duplicate)
        );
        assert_eq!(ledger.stock(ProductId::new(1)), Some(6));
    }

    #[tokio::test]
    async fn overdraw_is_an_inconsistency() {
        let ledger = InMemoryProductLedger::new();
        ledger.insert_product(keyboard(1));
        let event =
            StockAdjustment::consume(ProductId::new(1), 2, OrderId::new(), chrono::Utc::now());

        let err = ledger.apply_adjustment(&event).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(ledger.stock(ProductId::new(1)), Some(1));
    }
}
