//! In-process admin notification fan-out.

use futures::future::BoxFuture;
use ordersystem_core::{AdminNotification, AdminNotifier, NotificationError};
use tokio::sync::broadcast;

/// Fans notifications out to in-process subscribers over a tokio broadcast
/// channel.
///
/// Subscribers receive every notification and keep the ones addressed to
/// them (see [`BroadcastNotifier::subscribe_for`]). Publishing with no
/// subscriber online succeeds; nobody was listening, which is the normal
/// state when no operator is connected.
#[derive(Clone, Debug)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<AdminNotification>,
}

impl BroadcastNotifier {
    /// Create a channel buffering up to `capacity` notifications per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every notification.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AdminNotification> {
        self.sender.subscribe()
    }

    /// Receive the notifications addressed to `recipient`.
    ///
    /// Returns a stream that ends when the notifier is dropped. Lagged
    /// subscribers skip what they missed.
    pub fn subscribe_for(
        &self,
        recipient: impl Into<String>,
    ) -> impl futures::Stream<Item = AdminNotification> + Send + 'static {
        let recipient = recipient.into();
        let mut receiver = self.sender.subscribe();
        async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(notification) if notification.recipient == recipient => yield notification,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(recipient = %recipient, skipped, "Notification subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

impl AdminNotifier for BroadcastNotifier {
    fn publish<'a>(
        &'a self,
        notification: &'a AdminNotification,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            match self.sender.send(notification.clone()) {
                Ok(receivers) => {
                    tracing::debug!(order_id = %notification.order_id, receivers, "Notification published");
                }
                Err(_) => {
                    tracing::debug!(order_id = %notification.order_id, "No notification subscribers online");
                }
            }
            Ok(())
        })
    }
}
