//! In-memory wiring of the whole stock core.

use std::sync::Arc;
use std::time::Duration;

use ordersystem_core::{AdminNotifier, Principal, Product, ProductId};
use ordersystem_runtime::{
    CoordinatorConfig, LedgerApplier, OrderCoordinator, OrderEnvironment, OrderQueryService,
    RetryPolicy,
};

use crate::mocks::{FixedClock, test_clock};
use crate::{
    InMemoryCounterStore, InMemoryDeadLetterSink, InMemoryMemberDirectory, InMemoryOrderStore,
    InMemoryProductLedger, InMemoryStockQueue, RecordingNotifier,
};

/// Admin recipient used by harness coordinators.
pub const ADMIN: &str = "admin@example.com";

/// Every in-memory collaborator, sharing state with the coordinators it
/// builds.
///
/// Fields are public so tests can seed data, inject faults, and inspect the
/// stores directly.
#[derive(Clone, Debug)]
pub struct TestHarness {
    /// Clock used for every timestamp
    pub clock: FixedClock,
    /// Counter store
    pub counters: InMemoryCounterStore,
    /// Stock adjustment queue
    pub queue: InMemoryStockQueue,
    /// Ledger and catalog
    pub ledger: InMemoryProductLedger,
    /// Order store (also the naive path, over `ledger`)
    pub orders: InMemoryOrderStore,
    /// Member directory
    pub members: InMemoryMemberDirectory,
    /// Admin notifications
    pub notifier: RecordingNotifier,
    /// Parked adjustments
    pub dead_letters: InMemoryDeadLetterSink,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Fresh, empty stores.
    #[must_use]
    pub fn new() -> Self {
        let ledger = InMemoryProductLedger::new();
        Self {
            clock: test_clock(),
            counters: InMemoryCounterStore::new(),
            queue: InMemoryStockQueue::with_redelivery_delay(Duration::from_millis(1)),
            orders: InMemoryOrderStore::with_ledger(ledger.clone()),
            ledger,
            members: InMemoryMemberDirectory::new(),
            notifier: RecordingNotifier::new(),
            dead_letters: InMemoryDeadLetterSink::new(),
        }
    }

    /// Add a product to the ledger and seed its counter with the same stock.
    pub fn seed_product(&self, id: i64, name: &str, stock: i64) -> ProductId {
        let product_id = ProductId::new(id);
        self.ledger.insert_product(Product {
            id: product_id,
            name: name.to_string(),
            category: None,
            stock_quantity: stock,
        });
        self.counters.seed(product_id, stock);
        product_id
    }

    /// Register a member and return the principal to order with.
    pub fn register_member(&self, email: &str) -> Principal {
        self.members.register(email).1
    }

    /// Retry policy with millisecond delays.
    #[must_use]
    pub fn fast_retry_policy() -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build()
    }

    /// Collaborators as trait objects.
    #[must_use]
    pub fn environment(&self) -> OrderEnvironment {
        self.environment_with_notifier(Arc::new(self.notifier.clone()))
    }

    /// Collaborators as trait objects, with a custom notifier.
    #[must_use]
    pub fn environment_with_notifier(&self, notifier: Arc<dyn AdminNotifier>) -> OrderEnvironment {
        OrderEnvironment {
            clock: Arc::new(self.clock.clone()),
            members: Arc::new(self.members.clone()),
            catalog: Arc::new(self.ledger.clone()),
            counters: Arc::new(self.counters.clone()),
            queue: Arc::new(self.queue.clone()),
            orders: Arc::new(self.orders.clone()),
            legacy_orders: Arc::new(self.orders.clone()),
            notifier,
        }
    }

    /// Coordinator over the harness stores.
    #[must_use]
    pub fn coordinator(&self) -> OrderCoordinator {
        OrderCoordinator::new(self.environment(), Self::config())
    }

    /// Coordinator over the harness stores with a custom notifier.
    #[must_use]
    pub fn coordinator_with_notifier(&self, notifier: Arc<dyn AdminNotifier>) -> OrderCoordinator {
        OrderCoordinator::new(self.environment_with_notifier(notifier), Self::config())
    }

    /// Query service over the harness stores.
    #[must_use]
    pub fn queries(&self) -> OrderQueryService {
        OrderQueryService::new(
            Arc::new(self.orders.clone()),
            Arc::new(self.ledger.clone()),
            Arc::new(self.members.clone()),
        )
    }

    /// Ledger applier over the harness ledger and dead-letter sink.
    #[must_use]
    pub fn applier(&self) -> LedgerApplier {
        LedgerApplier::new(
            Arc::new(self.ledger.clone()),
            Arc::new(self.dead_letters.clone()),
        )
    }

    /// Apply every pending adjustment to the ledger and return how many were
    /// acknowledged.
    pub async fn drain_queue(&self) -> usize {
        self.queue.run_until_idle(&self.applier()).await
    }

    fn config() -> CoordinatorConfig {
        CoordinatorConfig {
            admin_recipient: ADMIN.to_string(),
            retry_policy: Self::fast_retry_policy(),
        }
    }
}
