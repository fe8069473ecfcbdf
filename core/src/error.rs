//! Error taxonomy for the stock core.
//!
//! [`OrderError`] is what callers of the coordinator see. Every collaborator
//! has its own error type; the ones that can recover by retrying expose
//! `is_retryable()` so the coordinator and the stock worker can decide whether
//! to back off and try again.

use std::fmt;
use thiserror::Error;

use crate::types::{OrderId, OrderStatus, ProductId};

/// Errors surfaced by order creation, cancellation, and queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The caller carried no usable identity
    #[error("Caller is not authenticated")]
    Unauthenticated,

    /// No member matches the caller's login
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// A requested product does not exist
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Not enough stock for one line; all earlier lines were compensated
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, remaining {remaining}"
    )]
    InsufficientStock {
        /// The line that could not be admitted
        product_id: ProductId,
        /// Requested quantity
        requested: u32,
        /// Stock that was available when the line was rejected
        remaining: i64,
    },

    /// A backing store stayed unreachable after retries
    #[error("{store} unavailable: {reason}")]
    StoreUnavailable {
        /// Which store failed
        store: &'static str,
        /// Last underlying error
        reason: String,
    },

    /// The order is not in a cancelable state
    #[error("Order {0} is already canceled")]
    AlreadyCanceled(OrderId),

    /// Cancellation committed but some stock credits failed
    #[error("Order {order_id} canceled but {} compensation step(s) failed", .failures.len())]
    PartialCompensation {
        /// The canceled order
        order_id: OrderId,
        /// Every step that failed
        failures: Vec<CompensationFailure>,
    },

    /// The request was malformed
    #[error("Invalid order request: {0}")]
    Validation(String),
}

/// Which half of a stock credit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationStep {
    /// Counter store increment
    Counter,
    /// Stock adjustment publish
    Queue,
}

impl fmt::Display for CompensationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => f.write_str("counter"),
            Self::Queue => f.write_str("queue"),
        }
    }
}

/// One failed stock credit during cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    /// Product whose stock was not credited
    pub product_id: ProductId,
    /// Quantity that should have been credited
    pub quantity: u32,
    /// Which store rejected the credit
    pub step: CompensationStep,
    /// Last underlying error
    pub reason: String,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} credit of {} for product {} failed: {}",
            self.step, self.quantity, self.product_id, self.reason
        )
    }
}

/// Counter store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// No counter is seeded for the product
    #[error("No stock counter for product {0}")]
    NotFound(ProductId),

    /// The store could not be reached
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

impl CounterError {
    /// Transient errors are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Stock adjustment queue errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Publishing one adjustment failed
    #[error("Publish failed for product {product_id}: {reason}")]
    PublishFailed {
        /// Product of the adjustment
        product_id: ProductId,
        /// Transport error
        reason: String,
    },

    /// The consumer could not subscribe
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// An adjustment could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

impl QueueError {
    /// Transient errors are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PublishFailed { .. } | Self::Transport(_))
    }
}

/// Product ledger errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The adjustment cannot be applied without operator intervention
    #[error("Ledger inconsistency for product {product_id}: {reason}")]
    Inconsistency {
        /// Affected product
        product_id: ProductId,
        /// What is wrong
        reason: String,
    },

    /// The ledger could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Inconsistencies are never retried.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Inconsistency { .. })
    }
}

/// Returned by an adjustment handler to request redelivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Adjustment handler failed: {0}")]
pub struct HandlerError(pub String);

impl From<LedgerError> for HandlerError {
    fn from(err: LedgerError) -> Self {
        Self(err.to_string())
    }
}

/// Order store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The order does not exist
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A compare-and-set status change lost
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        /// Order
        order_id: OrderId,
        /// Status the caller expected
        expected: OrderStatus,
        /// Status actually stored
        actual: OrderStatus,
    },

    /// A referenced product does not exist
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Checked placement found too little stock
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// Product
        product_id: ProductId,
        /// Requested quantity
        requested: u32,
        /// Stock read inside the transaction
        available: i64,
    },

    /// Stored data could not be decoded
    #[error("Corrupt order record: {0}")]
    Corrupt(String),

    /// The store could not be reached
    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Transient errors are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Member resolution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemberError {
    /// Blank or missing principal
    #[error("Caller is not authenticated")]
    Unauthenticated,

    /// No member with this login
    #[error("Member not found: {0}")]
    NotFound(String),

    /// Member directory unreachable
    #[error("Member directory unavailable: {0}")]
    Unavailable(String),
}

/// Product catalog errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No such product
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// Catalog unreachable
    #[error("Product catalog unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    /// Transient errors are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Admin notification errors. Never propagated to order callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// Delivery to the channel failed
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    /// The notification could not be encoded
    #[error("Notification serialization failed: {0}")]
    Serialization(String),
}

impl From<MemberError> for OrderError {
    fn from(err: MemberError) -> Self {
        match err {
            MemberError::Unauthenticated => Self::Unauthenticated,
            MemberError::NotFound(login) => Self::MemberNotFound(login),
            MemberError::Unavailable(reason) => Self::StoreUnavailable {
                store: "member directory",
                reason,
            },
        }
    }
}

impl From<CatalogError> for OrderError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => Self::ProductNotFound(id),
            CatalogError::Unavailable(reason) => Self::StoreUnavailable {
                store: "product catalog",
                reason,
            },
        }
    }
}

impl From<CounterError> for OrderError {
    fn from(err: CounterError) -> Self {
        match err {
            CounterError::NotFound(id) => Self::ProductNotFound(id),
            CounterError::Unavailable(reason) => Self::StoreUnavailable {
                store: "counter store",
                reason,
            },
        }
    }
}

impl From<QueueError> for OrderError {
    fn from(err: QueueError) -> Self {
        Self::StoreUnavailable {
            store: "stock adjustment queue",
            reason: err.to_string(),
        }
    }
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::OrderNotFound(id),
            RepositoryError::StatusConflict { order_id, .. } => Self::AlreadyCanceled(order_id),
            RepositoryError::ProductNotFound(id) => Self::ProductNotFound(id),
            RepositoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::InsufficientStock {
                product_id,
                requested,
                remaining: available,
            },
            RepositoryError::Corrupt(reason) | RepositoryError::Unavailable(reason) => {
                Self::StoreUnavailable {
                    store: "order store",
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(CounterError::Unavailable("timeout".into()).is_retryable());
        assert!(!CounterError::NotFound(ProductId::new(1)).is_retryable());
        assert!(QueueError::Transport("broker down".into()).is_retryable());
        assert!(!QueueError::Serialization("bad json".into()).is_retryable());
        assert!(
            LedgerError::Inconsistency {
                product_id: ProductId::new(1),
                reason: "missing".into()
            }
            .is_fatal()
        );
        assert!(!LedgerError::Unavailable("pool closed".into()).is_fatal());
    }

    #[test]
    fn status_conflict_maps_to_already_canceled() {
        let order_id = OrderId::new();
        let err: OrderError = RepositoryError::StatusConflict {
            order_id,
            expected: OrderStatus::Ordered,
            actual: OrderStatus::Canceled,
        }
        .into();
        assert_eq!(err, OrderError::AlreadyCanceled(order_id));
    }

    #[test]
    fn partial_compensation_message_counts_failures() {
        let err = OrderError::PartialCompensation {
            order_id: OrderId::new(),
            failures: vec![CompensationFailure {
                product_id: ProductId::new(2),
                quantity: 3,
                step: CompensationStep::Queue,
                reason: "broker down".into(),
            }],
        };
        assert!(err.to_string().contains("1 compensation step(s) failed"));
    }
}
