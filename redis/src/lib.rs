//! Redis backends for the order system.
//!
//! - [`RedisCounterStore`]: the atomic per-product stock counters that admit
//!   orders
//! - [`RedisAlarmPublisher`]: admin "an order occurred" alarms over pub/sub
//!
//! Both hold a [`ConnectionManager`], which reconnects on its own and is cheap
//! to clone, so one connection can be shared between them.
//!
//! # Example
//!
//! ```no_run
//! use ordersystem_redis::{RedisAlarmPublisher, RedisCounterStore, connect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = connect("redis://127.0.0.1:6379").await?;
//! let counters = RedisCounterStore::from_manager(conn.clone());
//! let alarms = RedisAlarmPublisher::from_manager(conn);
//! # Ok(())
//! # }
//! ```

mod alarm;
mod counter;

pub use alarm::{ALARM_CHANNEL_PREFIX, RedisAlarmPublisher};
pub use counter::{KEY_PREFIX, RedisCounterStore};

use redis::Client;
use redis::aio::ConnectionManager;

/// Open a managed connection.
///
/// # Errors
///
/// Returns [`redis::RedisError`] if the URL is invalid or the server cannot be
/// reached.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    tracing::info!("Redis connection established");
    Ok(conn)
}
