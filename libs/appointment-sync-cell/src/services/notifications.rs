// libs/appointment-sync-cell/src/services/notifications.rs
use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::Notification;

/// Receives every reminder and realtime summary. How it is shown is up to the UI.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub type NotificationReceiver = broadcast::Receiver<Notification>;

/// Sink that keeps the most recent notifications and rebroadcasts each one.
pub struct NotificationFeed {
    sender: broadcast::Sender<Notification>,
    recent: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.sender.subscribe()
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(50)
    }
}

impl NotificationSink for NotificationFeed {
    fn notify(&self, notification: Notification) {
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            if self.capacity > 0 {
                recent.push_back(notification.clone());
            }
        }

        if let Err(e) = self.sender.send(notification) {
            // Nobody listening right now; the ring buffer still has it.
            debug!("No live notification subscribers: {}", e);
        }
    }
}
