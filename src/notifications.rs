use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Success,
    Error,
}

/// A user-facing message for one terminal workflow outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotifyLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Sink for workflow outcomes (toasts in the dashboard)
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Notification channel capacity
const BROADCAST_CAPACITY: usize = 256;

/// Fans notifications out to every connected subscriber and mirrors them into the log
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Error => error!("🔔 {}", message),
            _ => info!("🔔 {}", message),
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            message: message.to_string(),
            timestamp: Utc::now(),
        };

        // No subscribers is fine; the log line above still records it.
        if self.tx.send(notification).is_err() {
            debug!("No notification subscribers connected");
        }
    }
}
