//! Admin notification doubles.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use futures::future::BoxFuture;
use ordersystem_core::{AdminNotification, AdminNotifier, NotificationError};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Records every notification.
///
/// Notifications are published from a detached task, so tests wait with
/// [`wait_for`](Self::wait_for) instead of asserting immediately.
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<AdminNotification>>>,
    arrivals: Arc<Notify>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<AdminNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` notifications arrived or `timeout` passed.
    ///
    /// Returns whatever was received.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<AdminNotification> {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.arrivals.notified();
                if self.sent.lock().unwrap().len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.sent()
    }
}

impl AdminNotifier for RecordingNotifier {
    fn publish<'a>(
        &'a self,
        notification: &'a AdminNotification,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(notification.clone());
            self.arrivals.notify_waiters();
            Ok(())
        })
    }
}

/// Rejects every notification and counts attempts.
#[derive(Clone, Debug, Default)]
pub struct FailingNotifier {
    attempts: Arc<AtomicUsize>,
    arrivals: Arc<Notify>,
}

impl FailingNotifier {
    /// Create a notifier that always fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(AtomicOrdering::SeqCst)
    }

    /// Wait until at least `count` attempts were made or `timeout` passed.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> usize {
        let _ = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.arrivals.notified();
                if self.attempts() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await;
        self.attempts()
    }
}

impl AdminNotifier for FailingNotifier {
    fn publish<'a>(
        &'a self,
        _notification: &'a AdminNotification,
    ) -> BoxFuture<'a, Result<(), NotificationError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, AtomicOrdering::SeqCst);
            self.arrivals.notify_waiters();
            Err(NotificationError::Delivery("channel down".to_string()))
        })
    }
}
