use tokio::sync::broadcast;

use crate::dto::notification::Notification;

/// Per-session broadcast hub fanning notifications out to every subscriber.
pub struct SessionBus {
    sender: broadcast::Sender<Notification>,
}

impl SessionBus {
    /// Construct a new bus backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Send a notification to all current subscribers, returning how many received it.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }
}
