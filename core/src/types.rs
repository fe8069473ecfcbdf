//! Identifiers, the order aggregate, and stock adjustment events.
//!
//! # Ordering lifecycle
//!
//! An [`Ordering`] and its [`OrderDetail`]s are created together when an order
//! is placed. After that the detail list never changes; the only mutation is the
//! one-way status transition `ORDERED -> CANCELED`. Orders are never deleted.
//!
//! # Stock adjustments
//!
//! A [`StockAdjustment`] carries a signed delta for one product. Negative
//! deltas consume stock (order placed), positive deltas give it back (order
//! rejected after partial admission, or order canceled). Each event has its own
//! `event_id`, which the ledger uses to make redelivery a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::OrderError;

/// Product identifier (the ledger's primary key).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Create a product ID from its ledger key.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw ledger key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (used when loading from storage).
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Order aggregate identifier.
    OrderId
);
uuid_id!(
    /// Order detail (line) identifier.
    OrderDetailId
);
uuid_id!(
    /// Member identifier.
    MemberId
);
uuid_id!(
    /// One status change request. Repeating a change with the same id is a
    /// no-op success, so the request can be retried after a lost reply.
    StatusChangeId
);

/// The authenticated caller, identified by login email.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Create a principal from the login email.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    /// The login email.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the principal carries no identity at all.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved member: who is placing the order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    /// Member ID
    pub id: MemberId,
    /// Login email, also used as the notification actor
    pub email: String,
}

/// A product as held by the durable ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product ID
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Optional category label
    pub category: Option<String>,
    /// Ledger stock; never negative
    pub stock_quantity: i64,
}

/// Order status. `Canceled` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed and holding stock
    Ordered,
    /// Canceled; stock has been given back
    Canceled,
}

impl OrderStatus {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ordered => "ORDERED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ORDERED" => Some(Self::Ordered),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested line of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product to order
    pub product_id: ProductId,
    /// Requested quantity; must be positive
    pub quantity: u32,
}

impl OrderLine {
    /// Create an order line.
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// One persisted line of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Detail ID
    pub id: OrderDetailId,
    /// Referenced product (not owned)
    pub product_id: ProductId,
    /// Ordered quantity
    pub quantity: u32,
}

/// The order aggregate.
///
/// Fields are private: details can only be appended while the order is being
/// built, and status only moves through [`Ordering::cancel`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    id: OrderId,
    member: MemberIdentity,
    status: OrderStatus,
    details: Vec<OrderDetail>,
    created_at: DateTime<Utc>,
}

impl Ordering {
    /// Start a new order for `member` with no details.
    #[must_use]
    pub fn new(member: MemberIdentity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            member,
            status: OrderStatus::Ordered,
            details: Vec::new(),
            created_at,
        }
    }

    /// Rebuild an order loaded from storage.
    #[must_use]
    pub const fn restore(
        id: OrderId,
        member: MemberIdentity,
        status: OrderStatus,
        details: Vec<OrderDetail>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            member,
            status,
            details,
            created_at,
        }
    }

    /// Append a detail while the order is being assembled.
    pub fn add_detail(&mut self, product_id: ProductId, quantity: u32) -> OrderDetailId {
        let id = OrderDetailId::new();
        self.details.push(OrderDetail {
            id,
            product_id,
            quantity,
        });
        id
    }

    /// Move `ORDERED -> CANCELED`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::AlreadyCanceled`] if the order is not `ORDERED`.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Ordered => {
                self.status = OrderStatus::Canceled;
                Ok(())
            }
            OrderStatus::Canceled => Err(OrderError::AlreadyCanceled(self.id)),
        }
    }

    /// Order ID
    #[must_use]
    pub const fn id(&self) -> OrderId {
        self.id
    }

    /// Ordering member
    #[must_use]
    pub const fn member(&self) -> &MemberIdentity {
        &self.member
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Order details in request order
    #[must_use]
    pub fn details(&self) -> &[OrderDetail] {
        &self.details
    }

    /// Placement time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Why a stock adjustment was emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Stock consumed by a placed order line
    OrderPlaced,
    /// Consumption reversed because the order failed after admission
    OrderRejected,
    /// Stock given back by a cancellation
    OrderCanceled,
}

impl AdjustmentReason {
    /// Stable label for logs, metrics, and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::OrderRejected => "order_rejected",
            Self::OrderCanceled => "order_canceled",
        }
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed stock delta for one product, applied to the ledger by the stock
/// worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Deduplication key; stays the same across publish retries
    pub event_id: Uuid,
    /// Product to adjust
    pub product_id: ProductId,
    /// Negative consumes, positive gives back
    pub quantity_delta: i64,
    /// Why the adjustment exists
    pub reason: AdjustmentReason,
    /// Originating order, if any
    pub order_id: Option<OrderId>,
    /// When the adjustment was emitted
    pub occurred_at: DateTime<Utc>,
}

impl StockAdjustment {
    /// Consumption of `quantity` units by a placed order.
    #[must_use]
    pub fn consume(
        product_id: ProductId,
        quantity: u32,
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            product_id,
            quantity_delta: -i64::from(quantity),
            reason: AdjustmentReason::OrderPlaced,
            order_id: Some(order_id),
            occurred_at,
        }
    }

    /// Return of `quantity` units to stock.
    #[must_use]
    pub fn restore(
        product_id: ProductId,
        quantity: u32,
        reason: AdjustmentReason,
        order_id: Option<OrderId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            product_id,
            quantity_delta: i64::from(quantity),
            reason,
            order_id,
            occurred_at,
        }
    }

    /// The event that undoes this one in the ledger (fresh `event_id`,
    /// negated delta, reason `OrderRejected`).
    #[must_use]
    pub fn reversal(&self, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            product_id: self.product_id,
            quantity_delta: -self.quantity_delta,
            reason: AdjustmentReason::OrderRejected,
            order_id: self.order_id,
            occurred_at,
        }
    }

    /// Partition key for transports that shard by product.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.product_id.to_string()
    }
}

/// "An order occurred" message for operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNotification {
    /// Addressed subscriber (the configured admin)
    pub recipient: String,
    /// Who placed the order
    pub actor: String,
    /// The new order
    pub order_id: OrderId,
    /// When the notification was emitted
    pub sent_at: DateTime<Utc>,
}

impl AdminNotification {
    /// Human-readable message body.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{} placed order {}", self.actor, self.order_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member() -> MemberIdentity {
        MemberIdentity {
            id: MemberId::new(),
            email: "buyer@example.com".to_string(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn new_order_starts_ordered_with_no_details() {
        let ordering = Ordering::new(member(), at());
        assert_eq!(ordering.status(), OrderStatus::Ordered);
        assert!(ordering.details().is_empty());
        assert_eq!(ordering.created_at(), at());
    }

    #[test]
    fn details_keep_request_order() {
        let mut ordering = Ordering::new(member(), at());
        ordering.add_detail(ProductId::new(1), 2);
        ordering.add_detail(ProductId::new(2), 3);

        let products: Vec<_> = ordering.details().iter().map(|d| d.product_id).collect();
        assert_eq!(products, vec![ProductId::new(1), ProductId::new(2)]);
    }

    #[test]
    fn cancel_is_one_way() {
        let mut ordering = Ordering::new(member(), at());
        assert!(ordering.cancel().is_ok());
        assert_eq!(ordering.status(), OrderStatus::Canceled);

        let err = ordering.cancel().unwrap_err();
        assert!(matches!(err, OrderError::AlreadyCanceled(id) if id == ordering.id()));
        assert_eq!(ordering.status(), OrderStatus::Canceled);
    }

    #[test]
    fn status_uses_uppercase_labels() {
        assert_eq!(OrderStatus::Ordered.to_string(), "ORDERED");
        assert_eq!(OrderStatus::Canceled.to_string(), "CANCELED");
        assert_eq!(OrderStatus::parse("CANCELED"), Some(OrderStatus::Canceled));
        assert_eq!(OrderStatus::parse("canceled"), None);
        assert_eq!(
            serde_json::to_string(&OrderStatus::Ordered).unwrap(),
            "\"ORDERED\""
        );
    }

    #[test]
    fn consume_and_reversal_net_to_zero() {
        let order_id = OrderId::new();
        let consume = StockAdjustment::consume(ProductId::new(7), 4, order_id, at());
        let reversal = consume.reversal(at());

        assert_eq!(consume.quantity_delta, -4);
        assert_eq!(consume.reason, AdjustmentReason::OrderPlaced);
        assert_eq!(reversal.quantity_delta, 4);
        assert_eq!(reversal.reason, AdjustmentReason::OrderRejected);
        assert_eq!(reversal.order_id, Some(order_id));
        assert_ne!(consume.event_id, reversal.event_id);
    }

    #[test]
    fn adjustment_survives_json() {
        let event = StockAdjustment::restore(
            ProductId::new(3),
            5,
            AdjustmentReason::OrderCanceled,
            Some(OrderId::new()),
            at(),
        );
        let json = serde_json::to_vec(&event).unwrap();
        let decoded: StockAdjustment = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(event.partition_key(), "3");
    }

    #[test]
    fn blank_principal_is_detected() {
        assert!(Principal::new("   ").is_blank());
        assert!(!Principal::new("a@b.c").is_blank());
    }
}
