//! Order coordinator: admission, persistence, and cancellation.
//!
//! # Concurrent create path
//!
//! ```text
//! for each line (caller order):
//!     catalog.find_product
//!     counters.decrement ──► negative? increment back, unwind, reject
//!     queue.publish(-q)  ──► retries exhausted? unwind, reject
//! orders.save_order      ──► failed? unwind, reject
//! spawn(notifier.publish)     best-effort, never awaited
//! ```
//!
//! "Unwind" walks the reservations newest first: every consumption event
//! already published is followed by a reversal event so the ledger nets to
//! zero, and every decremented counter is incremented back. The counter store
//! is the only synchronization point; no lock is held across any of these
//! steps.
//!
//! Credits (reversals and cancellations) are published before the counter is
//! incremented. A concurrent order can only take the credited units after the
//! increment, so its debit always lands behind the credit on the product's
//! partition and the ledger never dips below zero in queue order.
//!
//! # Cancellation
//!
//! `ORDERED -> CANCELED` is a compare-and-set in the order store, so only one
//! of several concurrent cancels credits stock. Each cancel carries one
//! [`StatusChangeId`] across its retries. Every detail is then credited
//! through a positive adjustment event and on the counter; failures are
//! collected instead of stopping at the first one.
//!
//! # Naive path
//!
//! [`OrderCoordinator::create_order_naive`] hands the whole order to the
//! [`LegacyOrderStore`](ordersystem_core::LegacyOrderStore), which checks and
//! writes ledger stock inside one transaction without row locks. Concurrent
//! calls can lose updates. It is kept as a baseline.

use std::sync::Arc;
use std::time::Instant;

use ordersystem_core::environment::Clock;
use ordersystem_core::{
    AdjustmentReason, AdminNotification, AdminNotifier, CatalogError, CompensationFailure,
    CompensationStep, CounterError, CounterStore, LegacyOrderStore, MemberResolver, OrderError,
    OrderId, OrderLine, OrderRepository, OrderStatus, Ordering, Principal, ProductCatalog,
    ProductId, QueueError, RepositoryError, StatusChangeId, StockAdjustment, StockAdjustmentQueue,
    counter,
};

use crate::metrics::OrderMetrics;
use crate::reservation::Reservations;
use crate::retry::{RetryPolicy, retry_with_predicate};

/// Collaborators the coordinator drives.
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Timestamps for orders, events, and notifications
    pub clock: Arc<dyn Clock>,
    /// Principal to member resolution
    pub members: Arc<dyn MemberResolver>,
    /// Product lookups
    pub catalog: Arc<dyn ProductCatalog>,
    /// Atomic stock counters
    pub counters: Arc<dyn CounterStore>,
    /// Stock adjustment events
    pub queue: Arc<dyn StockAdjustmentQueue>,
    /// Order persistence
    pub orders: Arc<dyn OrderRepository>,
    /// Naive checked-placement path
    pub legacy_orders: Arc<dyn LegacyOrderStore>,
    /// Admin notification channel
    pub notifier: Arc<dyn AdminNotifier>,
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Subscriber that receives "order placed" notifications
    pub admin_recipient: String,
    /// Backoff for transient store failures
    pub retry_policy: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            admin_recipient: "admin@ordersystem.local".to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Orchestrates order creation, cancellation, and compensation.
pub struct OrderCoordinator {
    env: OrderEnvironment,
    config: CoordinatorConfig,
}

impl OrderCoordinator {
    /// Create a coordinator over `env`.
    #[must_use]
    pub const fn new(env: OrderEnvironment, config: CoordinatorConfig) -> Self {
        Self { env, config }
    }

    /// Active settings.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Place an order through the counter store.
    ///
    /// Either every line is admitted and the order is persisted, or every
    /// touched counter is restored and no order exists.
    ///
    /// # Errors
    ///
    /// - [`OrderError::Validation`] for an empty request or a zero quantity
    /// - [`OrderError::Unauthenticated`] / [`OrderError::MemberNotFound`]
    /// - [`OrderError::ProductNotFound`] for an unknown or unseeded product
    /// - [`OrderError::InsufficientStock`] when a line loses the decrement
    /// - [`OrderError::StoreUnavailable`] when a store stays down after retries
    #[tracing::instrument(skip_all, fields(principal = %principal, lines = lines.len()))]
    pub async fn create_order(
        &self,
        principal: &Principal,
        lines: &[OrderLine],
    ) -> Result<OrderId, OrderError> {
        let started = Instant::now();
        let result = self.admit_and_persist(principal, lines).await;
        match &result {
            Ok(order_id) => {
                OrderMetrics::record_created(started.elapsed());
                tracing::info!(order_id = %order_id, "Order created");
            }
            Err(e) => {
                OrderMetrics::record_rejected(rejection_reason(e));
                tracing::warn!(error = %e, "Order rejected");
            }
        }
        result
    }

    /// Place an order through the naive single-transaction path.
    ///
    /// Lost updates are possible under concurrency; see the module docs.
    ///
    /// # Errors
    ///
    /// Same client errors as [`create_order`](Self::create_order);
    /// [`OrderError::InsufficientStock`] comes from the stock read inside the
    /// transaction.
    #[tracing::instrument(skip_all, fields(principal = %principal, lines = lines.len()))]
    pub async fn create_order_naive(
        &self,
        principal: &Principal,
        lines: &[OrderLine],
    ) -> Result<OrderId, OrderError> {
        validate_lines(lines)?;
        let member = self.env.members.resolve_current_member(principal).await?;
        let mut ordering = Ordering::new(member, self.env.clock.now());
        for line in lines {
            let product = self.env.catalog.find_product(line.product_id).await?;
            ordering.add_detail(product.id, line.quantity);
        }

        match self.env.legacy_orders.place_order_checked(&ordering).await {
            Ok(order_id) => {
                tracing::info!(order_id = %order_id, "Order created (naive path)");
                Ok(order_id)
            }
            Err(e) => {
                let err = OrderError::from(e);
                OrderMetrics::record_rejected(rejection_reason(&err));
                tracing::warn!(error = %err, "Order rejected (naive path)");
                Err(err)
            }
        }
    }

    /// Cancel an order and give its stock back.
    ///
    /// # Errors
    ///
    /// - [`OrderError::OrderNotFound`] for an unknown order
    /// - [`OrderError::AlreadyCanceled`] if it is not `ORDERED` (including a
    ///   concurrent cancel that won the status change)
    /// - [`OrderError::PartialCompensation`] if the status changed but some
    ///   credits failed; every detail was still attempted
    #[tracing::instrument(skip_all, fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Ordering, OrderError> {
        let policy = &self.config.retry_policy;
        let mut ordering = retry_with_predicate(
            policy,
            "order lookup",
            || self.env.orders.find_order(order_id),
            RepositoryError::is_retryable,
        )
        .await?;

        ordering.cancel()?;
        // Shared by every attempt, so a retry after a lost reply sees its own
        // committed change as a success rather than a lost race
        let change_id = StatusChangeId::new();
        retry_with_predicate(
            policy,
            "order status change",
            || {
                self.env.orders.transition_status(
                    order_id,
                    OrderStatus::Ordered,
                    OrderStatus::Canceled,
                    change_id,
                )
            },
            RepositoryError::is_retryable,
        )
        .await?;
        OrderMetrics::record_canceled();

        let now = self.env.clock.now();
        let mut failures = Vec::new();
        for detail in ordering.details() {
            let credit = StockAdjustment::restore(
                detail.product_id,
                detail.quantity,
                AdjustmentReason::OrderCanceled,
                Some(order_id),
                now,
            );
            if let Err(e) = self.publish(&credit).await {
                failures.push(CompensationFailure {
                    product_id: detail.product_id,
                    quantity: detail.quantity,
                    step: CompensationStep::Queue,
                    reason: e.to_string(),
                });
            }

            if let Err(e) = self.increment(detail.product_id, detail.quantity).await {
                failures.push(CompensationFailure {
                    product_id: detail.product_id,
                    quantity: detail.quantity,
                    step: CompensationStep::Counter,
                    reason: e.to_string(),
                });
            } else {
                OrderMetrics::record_compensations(1);
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                OrderMetrics::record_compensation_failure();
                tracing::error!(
                    product_id = %failure.product_id,
                    quantity = failure.quantity,
                    step = %failure.step,
                    reason = %failure.reason,
                    "Cancellation credit failed"
                );
            }
            return Err(OrderError::PartialCompensation { order_id, failures });
        }

        tracing::info!(details = ordering.details().len(), "Order canceled");
        Ok(ordering)
    }

    /// Sellable stock for a product (counter value, never below zero).
    ///
    /// # Errors
    ///
    /// - [`OrderError::ProductNotFound`] if no counter is seeded
    /// - [`OrderError::StoreUnavailable`] if the counter store is down
    pub async fn available_stock(&self, product_id: ProductId) -> Result<u64, OrderError> {
        let raw = retry_with_predicate(
            &self.config.retry_policy,
            "counter read",
            || self.env.counters.get(product_id),
            CounterError::is_retryable,
        )
        .await?;
        raw.map(counter::available)
            .ok_or(OrderError::ProductNotFound(product_id))
    }

    async fn admit_and_persist(
        &self,
        principal: &Principal,
        lines: &[OrderLine],
    ) -> Result<OrderId, OrderError> {
        validate_lines(lines)?;
        let member = self.env.members.resolve_current_member(principal).await?;
        let mut ordering = Ordering::new(member, self.env.clock.now());
        let mut reservations = Reservations::default();

        for line in lines {
            if let Err(e) = self.admit_line(&mut ordering, *line, &mut reservations).await {
                self.unwind(&reservations).await;
                return Err(e);
            }
        }

        let saved = retry_with_predicate(
            &self.config.retry_policy,
            "order save",
            || self.env.orders.save_order(&ordering),
            RepositoryError::is_retryable,
        )
        .await;
        // Saves are idempotent per order id, so a retry after a lost reply
        // finds the committed order instead of failing
        let order_id = match saved {
            Ok(order_id) => order_id,
            Err(e) => {
                tracing::error!(error = %e, "Order save failed after admission");
                self.unwind(&reservations).await;
                return Err(e.into());
            }
        };

        self.notify_admin(&ordering);
        Ok(order_id)
    }

    async fn admit_line(
        &self,
        ordering: &mut Ordering,
        line: OrderLine,
        reservations: &mut Reservations,
    ) -> Result<(), OrderError> {
        let policy = &self.config.retry_policy;
        let product = retry_with_predicate(
            policy,
            "product lookup",
            || self.env.catalog.find_product(line.product_id),
            CatalogError::is_retryable,
        )
        .await?;

        let remaining = retry_with_predicate(
            policy,
            "counter decrement",
            || self.env.counters.decrement(product.id, line.quantity),
            CounterError::is_retryable,
        )
        .await
        .inspect_err(|e| {
            if matches!(e, CounterError::NotFound(_)) {
                tracing::warn!(product_id = %product.id, "Product has no seeded stock counter");
            }
        })?;

        if remaining < 0 {
            self.compensate_counter(product.id, line.quantity).await;
            return Err(OrderError::InsufficientStock {
                product_id: product.id,
                requested: line.quantity,
                remaining: (remaining + i64::from(line.quantity)).max(0),
            });
        }
        reservations.reserve(product.id, line.quantity);
        ordering.add_detail(product.id, line.quantity);

        let consumed =
            StockAdjustment::consume(product.id, line.quantity, ordering.id(), self.env.clock.now());
        self.publish(&consumed).await?;
        reservations.mark_published(consumed);
        Ok(())
    }

    /// Undo every reservation, newest first. Failures are logged and counted.
    async fn unwind(&self, reservations: &Reservations) {
        if !reservations.is_empty() {
            tracing::debug!(lines = reservations.len(), "Compensating admitted lines");
        }
        for reservation in reservations.newest_first() {
            if let Some(consumed) = &reservation.consumed {
                let reversal = consumed.reversal(self.env.clock.now());
                if let Err(e) = self.publish(&reversal).await {
                    OrderMetrics::record_compensation_failure();
                    tracing::error!(
                        product_id = %reservation.product_id,
                        event_id = %consumed.event_id,
                        error = %e,
                        "Reversal event not published; ledger will over-count consumption"
                    );
                }
            }
            self.compensate_counter(reservation.product_id, reservation.quantity)
                .await;
        }
    }

    async fn compensate_counter(&self, product_id: ProductId, quantity: u32) {
        match self.increment(product_id, quantity).await {
            Ok(value) => {
                OrderMetrics::record_compensations(1);
                tracing::debug!(product_id = %product_id, quantity, value, "Counter compensated");
            }
            Err(e) => {
                OrderMetrics::record_compensation_failure();
                tracing::error!(
                    product_id = %product_id,
                    quantity,
                    error = %e,
                    "Compensating increment failed; counter under-reports stock"
                );
            }
        }
    }

    async fn increment(&self, product_id: ProductId, quantity: u32) -> Result<i64, CounterError> {
        retry_with_predicate(
            &self.config.retry_policy,
            "counter increment",
            || self.env.counters.increment(product_id, quantity),
            CounterError::is_retryable,
        )
        .await
    }

    /// Publish with retries; every attempt carries the same `event_id`.
    async fn publish(&self, event: &StockAdjustment) -> Result<(), QueueError> {
        retry_with_predicate(
            &self.config.retry_policy,
            "adjustment publish",
            || self.env.queue.publish(event),
            QueueError::is_retryable,
        )
        .await
    }

    fn notify_admin(&self, ordering: &Ordering) {
        let notification = AdminNotification {
            recipient: self.config.admin_recipient.clone(),
            actor: ordering.member().email.clone(),
            order_id: ordering.id(),
            sent_at: self.env.clock.now(),
        };
        let notifier = Arc::clone(&self.env.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.publish(&notification).await {
                OrderMetrics::record_notification_failure();
                tracing::warn!(
                    order_id = %notification.order_id,
                    error = %e,
                    "Admin notification failed"
                );
            }
        });
    }
}

fn validate_lines(lines: &[OrderLine]) -> Result<(), OrderError> {
    if lines.is_empty() {
        return Err(OrderError::Validation(
            "an order needs at least one line".to_string(),
        ));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
        return Err(OrderError::Validation(format!(
            "quantity for product {} must be positive",
            line.product_id
        )));
    }
    Ok(())
}

/// Metric label for a failed request.
const fn rejection_reason(err: &OrderError) -> &'static str {
    match err {
        OrderError::Unauthenticated => "unauthenticated",
        OrderError::MemberNotFound(_) => "member_not_found",
        OrderError::ProductNotFound(_) => "product_not_found",
        OrderError::OrderNotFound(_) => "order_not_found",
        OrderError::InsufficientStock { .. } => "insufficient_stock",
        OrderError::StoreUnavailable { .. } => "store_unavailable",
        OrderError::AlreadyCanceled(_) => "already_canceled",
        OrderError::PartialCompensation { .. } => "partial_compensation",
        OrderError::Validation(_) => "validation",
    }
}
