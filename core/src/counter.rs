//! Counter store: the fast-path admission primitive.
//!
//! One signed integer per product. The store itself provides atomicity, so
//! any number of callers may decrement the same key concurrently without an
//! application lock. Callers decrement first and check afterwards:
//!
//! ```text
//! new = decrement(p, q)
//! if new < 0 { increment(p, q); reject }   // compensate
//! ```
//!
//! A key may therefore dip below zero for the short window between a losing
//! decrement and its compensating increment. [`available`] clamps that window
//! away for stock queries.

use futures::future::BoxFuture;

use crate::error::CounterError;
use crate::types::ProductId;

/// Atomic per-product stock counter.
///
/// # Implementations
///
/// - `RedisCounterStore` (`ordersystem-redis`) for production
/// - `InMemoryCounterStore` (`ordersystem-testing`) for tests
pub trait CounterStore: Send + Sync {
    /// Atomically subtract `amount` and return the resulting value.
    ///
    /// # Errors
    ///
    /// - [`CounterError::NotFound`] if no counter is seeded for the product
    ///   (the key is not created)
    /// - [`CounterError::Unavailable`] if the store cannot be reached
    fn decrement(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>>;

    /// Atomically add `amount` and return the resulting value.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] if the store cannot be reached.
    fn increment(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>>;

    /// Current raw value, `None` when unseeded.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] if the store cannot be reached.
    fn get(&self, product_id: ProductId) -> BoxFuture<'_, Result<Option<i64>, CounterError>>;

    /// Overwrite the counter.
    ///
    /// Only safe while no adjustment is in flight: any decrement admitted
    /// but not yet applied to the ledger is erased.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] if the store cannot be reached.
    fn set(&self, product_id: ProductId, value: i64) -> BoxFuture<'_, Result<(), CounterError>>;

    /// Write the counter only if no value exists yet; `true` when written.
    ///
    /// A live counter already reflects admitted decrements the ledger may not
    /// have applied, so it is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] if the store cannot be reached.
    fn set_if_absent(
        &self,
        product_id: ProductId,
        value: i64,
    ) -> BoxFuture<'_, Result<bool, CounterError>>;
}

/// Clamp a raw counter value to sellable stock.
#[must_use]
pub fn available(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}
