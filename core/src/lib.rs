//! # Order System Core
//!
//! Domain types, error taxonomy, and collaborator traits for the order system's
//! stock core.
//!
//! The stock core admits orders against a fast atomic counter store, moves the
//! resulting deltas through a durable queue, and applies them to the product
//! ledger from a single consumer. Cancellation runs the same path in reverse.
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────────┐
//! │ OrderCoordinator │
//! └────────┬─────────┘
//!          │ 1. decrement (atomic)
//!          ▼
//! ┌──────────────────┐
//! │  CounterStore    │◄─── admission decisions
//! └────────┬─────────┘
//!          │ 2. publish StockAdjustment
//!          ▼
//! ┌──────────────────────┐
//! │ StockAdjustmentQueue │◄─── at-least-once, ordered per product
//! └────────┬─────────────┘
//!          │ 3. single consumer
//!          ▼
//! ┌──────────────────┐
//! │  ProductLedger   │◄─── system of record
//! └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`]: identifiers, the [`Ordering`](types::Ordering) aggregate, and
//!   [`StockAdjustment`](types::StockAdjustment) events
//! - [`error`]: [`OrderError`](error::OrderError) and per-collaborator errors
//! - [`counter`], [`queue`], [`ledger`], [`orders`], [`notification`]: the
//!   collaborator traits the coordinator and the stock worker are built on
//! - [`environment`]: injected clock
//!
//! Every collaborator trait is dyn-compatible and returns boxed `Send`
//! futures, so implementations are shared as `Arc<dyn Trait>`.

pub mod counter;
pub mod error;
pub mod ledger;
pub mod notification;
pub mod orders;
pub mod queue;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use counter::CounterStore;
pub use ledger::{ApplyOutcome, DeadLetterSink, ProductCatalog, ProductLedger};
pub use notification::AdminNotifier;
pub use orders::{LegacyOrderStore, MemberResolver, OrderRepository};
pub use queue::{AdjustmentHandler, StockAdjustmentQueue};
pub use error::{
    CatalogError, CompensationFailure, CompensationStep, CounterError, HandlerError, LedgerError,
    MemberError, NotificationError, OrderError, QueueError, RepositoryError,
};
pub use types::{
    AdjustmentReason, AdminNotification, MemberId, MemberIdentity, OrderDetail, OrderDetailId,
    OrderId, OrderLine, OrderStatus, Ordering, Principal, Product, ProductId, StatusChangeId,
    StockAdjustment,
};

/// Environment module - injected dependencies that are not stores.
///
/// The coordinator and its collaborators never call `Utc::now()` directly;
/// timestamps come from a [`Clock`](environment::Clock) so tests stay
/// deterministic.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ordersystem_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time for production wiring.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
