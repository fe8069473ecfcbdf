//! # Order System Runtime
//!
//! The order coordinator, the stock worker, and the services around them.
//!
//! ## Core Components
//!
//! - **[`OrderCoordinator`]**: admits orders against the counter store,
//!   publishes stock adjustments, persists orders, and cancels them
//! - **[`StockWorker`]** + **[`LedgerApplier`]**: the single consumer that
//!   applies adjustments to the product ledger
//! - **[`OrderQueryService`]**: order listings
//! - **[`BroadcastNotifier`]**: in-process admin notification fan-out
//! - **[`seed_counters`]**: copies ledger stock into the counter store
//!
//! ## Example
//!
//! ```ignore
//! use ordersystem_runtime::{CoordinatorConfig, OrderCoordinator, OrderEnvironment};
//!
//! let coordinator = OrderCoordinator::new(environment, CoordinatorConfig::default());
//! let order_id = coordinator
//!     .create_order(&principal, &[OrderLine::new(product_id, 2)])
//!     .await?;
//! coordinator.cancel_order(order_id).await?;
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub mod consumer;
pub mod coordinator;
pub mod notifier;
pub mod queries;
pub mod seeding;

mod reservation;

pub use consumer::{LedgerApplier, StockWorker};
pub use coordinator::{CoordinatorConfig, OrderCoordinator, OrderEnvironment};
pub use notifier::BroadcastNotifier;
pub use queries::{OrderDetailView, OrderListView, OrderQueryService};
pub use retry::RetryPolicy;
pub use seeding::{SeedError, seed_counters};
