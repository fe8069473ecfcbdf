//! Admin notification channel.
//!
//! Fire-and-forget: the coordinator publishes from a detached task and only
//! logs failures. A notification never rolls back an order.

use futures::future::BoxFuture;

use crate::error::NotificationError;
use crate::types::AdminNotification;

/// Publishes "an order occurred" messages to subscribed operators.
pub trait AdminNotifier: Send + Sync {
    /// Publish one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] if the channel rejects the message.
    fn publish<'a>(
        &'a self,
        notification: &'a AdminNotification,
    ) -> BoxFuture<'a, Result<(), NotificationError>>;
}
