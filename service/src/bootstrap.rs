//! Resource management for infrastructure setup.
//!
//! [`Resources`] connects every backing store once and hands out the
//! collaborators the coordinator and the stock worker are built from:
//!
//! 1. Connect `PostgreSQL` and run migrations
//! 2. Connect Redis (counters and alarms share one managed connection)
//! 3. Build the Redpanda stock adjustment queue
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let resources = Resources::from_config(&config).await?;
//!
//! resources.seed_counters().await?;
//! let coordinator = resources.coordinator(&config);
//! ```

use std::sync::Arc;

use ordersystem_core::environment::SystemClock;
use ordersystem_postgres::{
    DeadLetterQueue, PostgresMemberDirectory, PostgresOrderStore, PostgresProductLedger,
};
use ordersystem_redis::{RedisAlarmPublisher, RedisCounterStore};
use ordersystem_redpanda::RedpandaStockQueue;
use ordersystem_runtime::{
    LedgerApplier, OrderCoordinator, OrderEnvironment, OrderQueryService, SeedError, StockWorker,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;

/// Every infrastructure resource the order system needs.
///
/// Cheap to clone; all stores share their underlying pools.
#[derive(Clone)]
pub struct Resources {
    /// Product ledger and catalog
    pub ledger: PostgresProductLedger,
    /// Orders and the checked-placement path
    pub orders: PostgresOrderStore,
    /// Principal to member resolution
    pub members: PostgresMemberDirectory,
    /// Parked adjustments
    pub dead_letters: DeadLetterQueue,
    /// Stock counters
    pub counters: RedisCounterStore,
    /// Admin alarms
    pub alarms: RedisAlarmPublisher,
    /// Stock adjustment queue
    pub queue: Arc<RedpandaStockQueue>,
}

impl Resources {
    /// Connect every store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a database connection, a migration, the Redis
    /// connection, or the queue setup fails.
    pub async fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to PostgreSQL...");
        let pool = ordersystem_postgres::connect(&config.postgres.url, &config.pool_settings())
            .await?;
        info!("Running migrations...");
        ordersystem_postgres::migrate(&pool).await?;
        info!("PostgreSQL ready");

        info!("Connecting to Redis...");
        let redis = ordersystem_redis::connect(&config.redis.url).await?;
        info!("Redis ready");

        info!("Connecting to Redpanda...");
        let queue = RedpandaStockQueue::builder()
            .brokers(&config.redpanda.brokers)
            .topic(&config.redpanda.stock_topic)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .redelivery_delay(config.redelivery_delay())
            .max_redeliveries(config.redpanda.max_redeliveries)
            .build()?;
        info!(topic = queue.topic(), "Redpanda ready");

        Ok(Self {
            ledger: PostgresProductLedger::new(pool.clone()),
            orders: PostgresOrderStore::new(pool.clone()),
            members: PostgresMemberDirectory::new(pool.clone()),
            dead_letters: DeadLetterQueue::new(pool),
            counters: RedisCounterStore::from_manager(redis.clone()),
            alarms: RedisAlarmPublisher::from_manager(redis),
            queue: Arc::new(queue),
        })
    }

    /// Copy ledger stock into counters that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] if the ledger cannot be read or a counter cannot
    /// be written.
    pub async fn seed_counters(&self) -> Result<usize, SeedError> {
        ordersystem_runtime::seed_counters(&self.ledger, &self.counters).await
    }

    /// Collaborators for an [`OrderCoordinator`].
    #[must_use]
    pub fn environment(&self) -> OrderEnvironment {
        OrderEnvironment {
            clock: Arc::new(SystemClock),
            members: Arc::new(self.members.clone()),
            catalog: Arc::new(self.ledger.clone()),
            counters: Arc::new(self.counters.clone()),
            queue: Arc::clone(&self.queue) as _,
            orders: Arc::new(self.orders.clone()),
            legacy_orders: Arc::new(self.orders.clone()),
            notifier: Arc::new(self.alarms.clone()),
        }
    }

    /// Coordinator over these resources.
    #[must_use]
    pub fn coordinator(&self, config: &Config) -> OrderCoordinator {
        OrderCoordinator::new(self.environment(), config.coordinator_config())
    }

    /// Order listings over these resources.
    #[must_use]
    pub fn queries(&self) -> OrderQueryService {
        OrderQueryService::new(
            Arc::new(self.orders.clone()),
            Arc::new(self.ledger.clone()),
            Arc::new(self.members.clone()),
        )
    }

    /// The single consumer that applies adjustments to the ledger.
    #[must_use]
    pub fn stock_worker(&self, shutdown: broadcast::Receiver<()>) -> StockWorker {
        let applier = LedgerApplier::new(
            Arc::new(self.ledger.clone()),
            Arc::new(self.dead_letters.clone()),
        );
        StockWorker::new("stock-worker", Arc::clone(&self.queue) as _, Arc::new(applier), shutdown)
    }
}
