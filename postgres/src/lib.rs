//! `PostgreSQL` storage for the order system.
//!
//! - [`PostgresProductLedger`]: the durable product ledger and catalog,
//!   written one adjustment per transaction by the stock worker
//! - [`PostgresOrderStore`]: orders and their details, plus the naive
//!   checked-placement path
//! - [`PostgresMemberDirectory`]: principal to member resolution
//! - [`DeadLetterQueue`]: adjustments the ledger could not apply
//!
//! Queries are built at runtime with `sqlx::query`, so the crate compiles
//! without a live database.
//!
//! # Example
//!
//! ```no_run
//! use ordersystem_postgres::{PoolSettings, PostgresProductLedger, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/orders", &PoolSettings::default()).await?;
//! migrate(&pool).await?;
//! let ledger = PostgresProductLedger::new(pool);
//! # Ok(())
//! # }
//! ```

pub mod dead_letter_queue;
mod ledger;
mod members;
mod orders;

pub use dead_letter_queue::{DLQStatus, DeadLetterQueue, FailedAdjustment};
pub use ledger::PostgresProductLedger;
pub use members::PostgresMemberDirectory;
pub use orders::PostgresOrderStore;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Errors from pool setup, migrations, and dead-letter administration.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Connection pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a connection
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are closed
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if no connection can be established.
pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(database_url)
        .await?;
    tracing::info!(
        max_connections = settings.max_connections,
        "PostgreSQL pool connected"
    );
    Ok(pool)
}

/// Create or upgrade the order system tables.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// `true` for a foreign key violation (SQLSTATE 23503).
fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503")
}
