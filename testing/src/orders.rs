//! In-memory order store, including the naive checked-placement path.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::{
    LegacyOrderStore, MemberId, OrderId, OrderRepository, OrderStatus, Ordering, RepositoryError,
    StatusChangeId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use crate::ledger::InMemoryProductLedger;

/// Order store holding orders in insertion order.
///
/// When built with [`with_ledger`](Self::with_ledger) it also implements the
/// naive [`LegacyOrderStore`] path against that ledger. The stock read and the
/// stock write of each line are separate critical sections with a yield
/// between them, the same shape as a READ COMMITTED session that reads
/// without `FOR UPDATE`, so concurrent placements can lose updates.
///
/// Like the `PostgreSQL` store, a repeated save of the same order succeeds
/// without writing and a repeated status change with the same
/// [`StatusChangeId`] succeeds.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Ordering>>>,
    status_changes: Arc<RwLock<HashMap<OrderId, StatusChangeId>>>,
    ledger: Option<InMemoryProductLedger>,
    save_failures: Arc<AtomicUsize>,
    lost_save_acks: Arc<AtomicUsize>,
    lost_transition_acks: Arc<AtomicUsize>,
}

impl InMemoryOrderStore {
    /// Create an empty store without a legacy ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose naive path writes to `ledger`.
    #[must_use]
    pub fn with_ledger(ledger: InMemoryProductLedger) -> Self {
        Self {
            ledger: Some(ledger),
            ..Self::default()
        }
    }

    /// Fail the next `count` saves with `Unavailable`.
    pub fn fail_next_saves(&self, count: usize) {
        self.save_failures.store(count, AtomicOrdering::SeqCst);
    }

    /// Commit the next `count` saves, then report `Unavailable` anyway.
    pub fn lose_next_save_acks(&self, count: usize) {
        self.lost_save_acks.store(count, AtomicOrdering::SeqCst);
    }

    /// Commit the next `count` status changes, then report `Unavailable`
    /// anyway.
    pub fn lose_next_transition_acks(&self, count: usize) {
        self.lost_transition_acks.store(count, AtomicOrdering::SeqCst);
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().unwrap().len()
    }

    /// `true` when no order is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().unwrap().is_empty()
    }

    /// Snapshot of one order.
    #[must_use]
    pub fn get(&self, order_id: OrderId) -> Option<Ordering> {
        self.orders
            .read()
            .unwrap()
            .iter()
            .find(|ordering| ordering.id() == order_id)
            .cloned()
    }

    fn insert(&self, ordering: &Ordering) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().unwrap();
        match orders.iter().find(|stored| stored.id() == ordering.id()) {
            Some(stored)
                if stored.member().id == ordering.member().id
                    && stored.details() == ordering.details() =>
            {
                Ok(())
            }
            Some(_) => Err(RepositoryError::Corrupt(format!(
                "order id {} already used by a different order",
                ordering.id()
            ))),
            None => {
                orders.push(ordering.clone());
                Ok(())
            }
        }
    }

    fn lost_ack() -> RepositoryError {
        RepositoryError::Unavailable("connection reset after commit".to_string())
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
            n.checked_sub(1)
        })
        .is_ok()
}

impl OrderRepository for InMemoryOrderStore {
    fn save_order<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>> {
        Box::pin(async move {
            if take_one(&self.save_failures) {
                return Err(RepositoryError::Unavailable("injected failure".to_string()));
            }
            self.insert(ordering)?;
            if take_one(&self.lost_save_acks) {
                return Err(Self::lost_ack());
            }
            Ok(ordering.id())
        })
    }

    fn find_order(&self, order_id: OrderId) -> BoxFuture<'_, Result<Ordering, RepositoryError>> {
        Box::pin(async move { self.get(order_id).ok_or(RepositoryError::NotFound(order_id)) })
    }

    fn find_orders_by_member(
        &self,
        member_id: MemberId,
    ) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>> {
        Box::pin(async move {
            Ok(self
                .orders
                .read()
                .unwrap()
                .iter()
                .filter(|ordering| ordering.member().id == member_id)
                .cloned()
                .collect())
        })
    }

    fn find_all_orders(&self) -> BoxFuture<'_, Result<Vec<Ordering>, RepositoryError>> {
        Box::pin(async move { Ok(self.orders.read().unwrap().clone()) })
    }

    fn transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        change_id: StatusChangeId,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move {
            {
                let mut orders = self.orders.write().unwrap();
                let mut changes = self.status_changes.write().unwrap();
                let ordering = orders
                    .iter_mut()
                    .find(|ordering| ordering.id() == order_id)
                    .ok_or(RepositoryError::NotFound(order_id))?;

                let repeated =
                    ordering.status() == to && changes.get(&order_id) == Some(&change_id);
                if ordering.status() != from && !repeated {
                    return Err(RepositoryError::StatusConflict {
                        order_id,
                        expected: from,
                        actual: ordering.status(),
                    });
                }
                *ordering = Ordering::restore(
                    ordering.id(),
                    ordering.member().clone(),
                    to,
                    ordering.details().to_vec(),
                    ordering.created_at(),
                );
                changes.insert(order_id, change_id);
            }
            if take_one(&self.lost_transition_acks) {
                return Err(Self::lost_ack());
            }
            Ok(())
        })
    }
}

impl LegacyOrderStore for InMemoryOrderStore {
    fn place_order_checked<'a>(
        &'a self,
        ordering: &'a Ordering,
    ) -> BoxFuture<'a, Result<OrderId, RepositoryError>> {
        Box::pin(async move {
            let ledger = self.ledger.as_ref().ok_or_else(|| {
                RepositoryError::Unavailable("no ledger attached".to_string())
            })?;

            // Values read before each write, for rollback
            let mut undo = Vec::with_capacity(ordering.details().len());
            for detail in ordering.details() {
                let available = ledger
                    .stock(detail.product_id)
                    .ok_or(RepositoryError::ProductNotFound(detail.product_id))?;

                // Another session may run between this read and the write below
                tokio::task::yield_now().await;

                let requested = i64::from(detail.quantity);
                if available < requested {
                    for (product_id, previous) in undo.into_iter().rev() {
                        ledger.write_stock(product_id, previous);
                    }
                    return Err(RepositoryError::InsufficientStock {
                        product_id: detail.product_id,
                        requested: detail.quantity,
                        available,
                    });
                }
                ledger.write_stock(detail.product_id, available - requested);
                undo.push((detail.product_id, available));
            }

            if let Err(e) = self.insert(ordering) {
                for (product_id, previous) in undo.into_iter().rev() {
                    ledger.write_stock(product_id, previous);
                }
                return Err(e);
            }
            Ok(ordering.id())
        })
    }
}
