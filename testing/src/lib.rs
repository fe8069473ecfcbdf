//! # Order System Testing
//!
//! In-memory doubles and helpers for testing the stock core without Redis,
//! Redpanda, or PostgreSQL.
//!
//! This crate provides:
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`InMemoryCounterStore`], [`InMemoryStockQueue`], [`InMemoryProductLedger`],
//!   [`InMemoryOrderStore`], [`InMemoryMemberDirectory`]: collaborator doubles
//!   with fault injection
//! - [`RecordingNotifier`] / [`FailingNotifier`]: admin notification doubles
//! - [`TestHarness`]: everything above wired into an `OrderCoordinator`
//! - [`properties`]: proptest strategies for order requests
//!
//! ## Example
//!
//! ```
//! use ordersystem_core::OrderLine;
//! use ordersystem_testing::TestHarness;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let harness = TestHarness::new();
//! let product = harness.seed_product(1, "Keyboard", 10);
//! let buyer = harness.register_member("buyer@example.com");
//!
//! let coordinator = harness.coordinator();
//! coordinator
//!     .create_order(&buyer, &[OrderLine::new(product, 3)])
//!     .await?;
//!
//! assert_eq!(harness.counters.value(product), Some(7));
//! # Ok(())
//! # }
//! ```

mod counter;
mod harness;
mod ledger;
mod members;
mod notifier;
mod orders;
mod queue;

pub use counter::InMemoryCounterStore;
pub use harness::{ADMIN, TestHarness};
pub use ledger::{InMemoryDeadLetterSink, InMemoryProductLedger};
pub use members::InMemoryMemberDirectory;
pub use notifier::{FailingNotifier, RecordingNotifier};
pub use orders::InMemoryOrderStore;
pub use queue::InMemoryStockQueue;

use chrono::{DateTime, Utc};
use ordersystem_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ordersystem_testing::mocks::FixedClock;
    /// use ordersystem_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies.
pub mod properties {
    use ordersystem_core::{OrderLine, ProductId};
    use proptest::prelude::*;

    /// One order line over products `1..=products` with quantity `1..=max_quantity`.
    pub fn order_line(products: i64, max_quantity: u32) -> impl Strategy<Value = OrderLine> {
        (1..=products, 1..=max_quantity)
            .prop_map(|(product, quantity)| OrderLine::new(ProductId::new(product), quantity))
    }

    /// A non-empty order request of up to `max_lines` lines.
    pub fn order_request(
        products: i64,
        max_quantity: u32,
        max_lines: usize,
    ) -> impl Strategy<Value = Vec<OrderLine>> {
        prop::collection::vec(order_line(products, max_quantity), 1..=max_lines)
    }
}

/// Install a test-friendly tracing subscriber (idempotent).
///
/// Output goes through the test harness writer so it only shows for failing
/// tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
