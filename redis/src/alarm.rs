//! Admin alarms over Redis pub/sub.

use futures::future::BoxFuture;
use ordersystem_core::{AdminNotification, AdminNotifier, NotificationError};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Channel prefix; the full channel is `order-alarm:{recipient}`.
pub const ALARM_CHANNEL_PREFIX: &str = "order-alarm:";

/// Publishes each [`AdminNotification`] as JSON on the recipient's channel.
///
/// Pub/sub does not store messages: a notification with no subscriber
/// listening is dropped, which matches the fire-and-forget contract.
#[derive(Clone)]
pub struct RedisAlarmPublisher {
    conn_manager: ConnectionManager,
}

impl RedisAlarmPublisher {
    /// Connect to `redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError::Delivery`] if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, NotificationError> {
        let conn_manager = crate::connect(redis_url).await.map_err(|e| {
            NotificationError::Delivery(format!("Failed to connect to Redis: {e}"))
        })?;
        Ok(Self::from_manager(conn_manager))
    }

    /// Use an existing connection.
    #[must_use]
    pub const fn from_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    /// Channel a recipient subscribes to.
    #[must_use]
    pub fn channel(recipient: &str) -> String {
        format!("{ALARM_CHANNEL_PREFIX}{recipient}")
    }
}

impl AdminNotifier for RedisAlarmPublisher {
    fn publish<'a>(
        &'a self,
        notification: &'a AdminNotification,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            let payload = serde_json::to_string(notification)
                .map_err(|e| NotificationError::Serialization(e.to_string()))?;
            let channel = Self::channel(&notification.recipient);

            let mut conn = self.conn_manager.clone();
            let receivers: i64 = conn
                .publish(&channel, payload)
                .await
                .map_err(|e| NotificationError::Delivery(e.to_string()))?;

            tracing::debug!(
                channel = %channel,
                order_id = %notification.order_id,
                receivers,
                "Admin alarm published"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_is_per_recipient() {
        assert_eq!(
            RedisAlarmPublisher::channel("admin@ordersystem.local"),
            "order-alarm:admin@ordersystem.local"
        );
    }
}
