//! In-memory counter store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::{CounterError, CounterStore, ProductId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

/// Counter store backed by one `AtomicI64` per product.
///
/// The map lock is only held to find (or create) a counter; the arithmetic
/// itself is a single `fetch_sub`/`fetch_add`, so concurrent decrements are
/// linearizable exactly like `DECRBY` in Redis.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<ProductId, Arc<AtomicI64>>>>,
    failures_remaining: Arc<AtomicUsize>,
    failing_increments: Arc<RwLock<HashSet<ProductId>>>,
    decrements: Arc<AtomicUsize>,
    increments: Arc<AtomicUsize>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter synchronously.
    pub fn seed(&self, product_id: ProductId, value: i64) {
        self.counters
            .write()
            .unwrap()
            .insert(product_id, Arc::new(AtomicI64::new(value)));
    }

    /// Current value, `None` when unseeded.
    #[must_use]
    pub fn value(&self, product_id: ProductId) -> Option<i64> {
        self.counters
            .read()
            .unwrap()
            .get(&product_id)
            .map(|counter| counter.load(AtomicOrdering::SeqCst))
    }

    /// Fail the next `count` operations of any kind with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, AtomicOrdering::SeqCst);
    }

    /// Make every increment of `product_id` fail with `Unavailable`.
    pub fn fail_increments_for(&self, product_id: ProductId) {
        self.failing_increments.write().unwrap().insert(product_id);
    }

    /// Number of decrement calls that reached a counter.
    #[must_use]
    pub fn decrement_count(&self) -> usize {
        self.decrements.load(AtomicOrdering::SeqCst)
    }

    /// Number of increment calls that reached a counter.
    #[must_use]
    pub fn increment_count(&self) -> usize {
        self.increments.load(AtomicOrdering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }

    fn counter(&self, product_id: ProductId) -> Option<Arc<AtomicI64>> {
        self.counters.read().unwrap().get(&product_id).cloned()
    }

    fn counter_or_zero(&self, product_id: ProductId) -> Arc<AtomicI64> {
        if let Some(counter) = self.counter(product_id) {
            return counter;
        }
        Arc::clone(
            self.counters
                .write()
                .unwrap()
                .entry(product_id)
                .or_insert_with(|| Arc::new(AtomicI64::new(0))),
        )
    }

    fn injected() -> CounterError {
        CounterError::Unavailable("injected failure".to_string())
    }
}

impl CounterStore for InMemoryCounterStore {
    fn decrement(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(Self::injected());
            }
            let counter = self
                .counter(product_id)
                .ok_or(CounterError::NotFound(product_id))?;
            self.decrements.fetch_add(1, AtomicOrdering::SeqCst);
            let amount = i64::from(amount);
            Ok(counter.fetch_sub(amount, AtomicOrdering::SeqCst) - amount)
        })
    }

    fn increment(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            if self.take_failure() || self.failing_increments.read().unwrap().contains(&product_id)
            {
                return Err(Self::injected());
            }
            // INCRBY semantics: an absent key starts at zero
            let counter = self.counter_or_zero(product_id);
            self.increments.fetch_add(1, AtomicOrdering::SeqCst);
            let amount = i64::from(amount);
            Ok(counter.fetch_add(amount, AtomicOrdering::SeqCst) + amount)
        })
    }

    fn get(&self, product_id: ProductId) -> BoxFuture<'_, Result<Option<i64>, CounterError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(Self::injected());
            }
            Ok(self.value(product_id))
        })
    }

    fn set(&self, product_id: ProductId, value: i64) -> BoxFuture<'_, Result<(), CounterError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(Self::injected());
            }
            self.seed(product_id, value);
            Ok(())
        })
    }

    fn set_if_absent(
        &self,
        product_id: ProductId,
        value: i64,
    ) -> BoxFuture<'_, Result<bool, CounterError>> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(Self::injected());
            }
            let mut counters = self.counters.write().unwrap();
            if counters.contains_key(&product_id) {
                return Ok(false);
            }
            counters.insert(product_id, Arc::new(AtomicI64::new(value)));
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decrement_returns_new_value() {
        let store = InMemoryCounterStore::new();
        store.seed(ProductId::new(1), 10);

        assert_eq!(store.decrement(ProductId::new(1), 3).await, Ok(7));
        assert_eq!(store.decrement(ProductId::new(1), 9).await, Ok(-2));
        assert_eq!(store.increment(ProductId::new(1), 9).await, Ok(7));
    }

    #[tokio::test]
    async fn decrement_of_unseeded_key_does_not_create_it() {
        let store = InMemoryCounterStore::new();
        assert_eq!(
            store.decrement(ProductId::new(5), 1).await,
            Err(CounterError::NotFound(ProductId::new(5)))
        );
        assert_eq!(store.value(ProductId::new(5)), None);
    }

    #[tokio::test]
    async fn set_if_absent_keeps_live_counters() {
        let store = InMemoryCounterStore::new();
        store.seed(ProductId::new(1), 4);

        assert_eq!(store.set_if_absent(ProductId::new(1), 10).await, Ok(false));
        assert_eq!(store.set_if_absent(ProductId::new(2), 10).await, Ok(true));
        assert_eq!(store.value(ProductId::new(1)), Some(4));
        assert_eq!(store.value(ProductId::new(2)), Some(10));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = InMemoryCounterStore::new();
        store.seed(ProductId::new(1), 1);
        store.fail_next(1);

        assert!(store.get(ProductId::new(1)).await.is_err());
        assert_eq!(store.get(ProductId::new(1)).await, Ok(Some(1)));
    }
}
