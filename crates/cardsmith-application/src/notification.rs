//! User-facing notification channel.
//!
//! Engine errors that the user should see (quota warnings, scarcity hints,
//! failed generations) are published here instead of being returned to
//! whoever happened to trigger a background task.

use serde::Serialize;
use strum::{AsRefStr, Display};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Broadcasts notifications to every subscriber.
///
/// Publishing never fails: with no subscribers the notification is only logged.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Warning => tracing::warn!("[Notifier] {}", message),
            NotificationLevel::Error => tracing::error!("[Notifier] {}", message),
            _ => tracing::info!("[Notifier] {}", message),
        }
        let _ = self.sender.send(Notification { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, message);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.warning("Storage is almost full");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.level, NotificationLevel::Warning);
        assert_eq!(received.message, "Storage is almost full");
    }

    #[test]
    fn test_notify_without_subscribers_does_not_panic() {
        Notifier::new(1).error("nobody listening");
    }
}
