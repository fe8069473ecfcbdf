//! Stock counters in Redis.
//!
//! One integer key per product, `stock:{product_id}`. Every operation is a
//! single Redis command or script, so concurrent callers never need a lock.

use futures::future::BoxFuture;
use ordersystem_core::{CounterError, CounterStore, ProductId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Prefix of every counter key.
pub const KEY_PREFIX: &str = "stock:";

// DECRBY would create a missing key at -amount; an unseeded product must be
// rejected instead, so the existence check runs in the same atomic step.
const DECREMENT_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return false
    end
    return redis.call('DECRBY', KEYS[1], ARGV[1])
";

/// `Redis`-backed [`CounterStore`].
///
/// # Example
///
/// ```no_run
/// use ordersystem_core::{CounterStore, ProductId};
/// use ordersystem_redis::RedisCounterStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let counters = RedisCounterStore::new("redis://127.0.0.1:6379").await?;
///
/// counters.set_if_absent(ProductId::new(1), 10).await?;
/// let remaining = counters.decrement(ProductId::new(1), 3).await?;
/// assert_eq!(remaining, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCounterStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    decrement: redis::Script,
}

impl RedisCounterStore {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterError::Unavailable`] if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CounterError> {
        let conn_manager = crate::connect(redis_url).await.map_err(|e| {
            CounterError::Unavailable(format!("Failed to connect to Redis: {e}"))
        })?;
        Ok(Self::from_manager(conn_manager))
    }

    /// Use an existing connection.
    #[must_use]
    pub fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            decrement: redis::Script::new(DECREMENT_SCRIPT),
        }
    }

    /// Get the `Redis` key for a product's counter.
    fn counter_key(product_id: ProductId) -> String {
        format!("{KEY_PREFIX}{product_id}")
    }
}

fn unavailable(op: &str, product_id: ProductId, err: &redis::RedisError) -> CounterError {
    tracing::warn!(product_id = %product_id, error = %err, "Redis {op} failed");
    CounterError::Unavailable(format!("{op} failed: {err}"))
}

impl CounterStore for RedisCounterStore {
    fn decrement(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let remaining: Option<i64> = self
                .decrement
                .key(Self::counter_key(product_id))
                .arg(amount)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| unavailable("decrement", product_id, &e))?;

            remaining.ok_or(CounterError::NotFound(product_id))
        })
    }

    fn increment(
        &self,
        product_id: ProductId,
        amount: u32,
    ) -> BoxFuture<'_, Result<i64, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.incr(Self::counter_key(product_id), amount)
                .await
                .map_err(|e| unavailable("increment", product_id, &e))
        })
    }

    fn get(&self, product_id: ProductId) -> BoxFuture<'_, Result<Option<i64>, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(Self::counter_key(product_id))
                .await
                .map_err(|e| unavailable("get", product_id, &e))
        })
    }

    fn set(&self, product_id: ProductId, value: i64) -> BoxFuture<'_, Result<(), CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.set::<_, _, ()>(Self::counter_key(product_id), value)
                .await
                .map_err(|e| unavailable("set", product_id, &e))
        })
    }

    fn set_if_absent(
        &self,
        product_id: ProductId,
        value: i64,
    ) -> BoxFuture<'_, Result<bool, CounterError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.set_nx(Self::counter_key(product_id), value)
                .await
                .map_err(|e| unavailable("set_nx", product_id, &e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_keys_are_prefixed() {
        assert_eq!(RedisCounterStore::counter_key(ProductId::new(42)), "stock:42");
    }
}
