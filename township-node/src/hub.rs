//! Notification hub for push clients.
//!
//! The hub drains its own fan-out queue and rebroadcasts every notification
//! on a `broadcast` channel. Each SSE client holds a receiver; a client that
//! falls behind skips what it missed and keeps going.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use township_lifecycle::{Notification, NotificationFanout, NotificationSink, SubscriberError};

#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Send to every connected client.
    pub fn broadcast(&self, notification: Notification) {
        // Ignore send errors (no clients)
        let _ = self.sender.send(notification);
    }

    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Start forwarding everything published on `fanout`.
    ///
    /// Must be called from within a Tokio runtime. The task ends when the
    /// fan-out is dropped.
    pub fn attach(&self, fanout: &NotificationFanout, timeout: Duration) -> JoinHandle<()> {
        let queue = fanout.subscribe_all_queue();
        tokio::spawn(queue.forward_to(self.clone(), timeout))
    }
}

#[async_trait]
impl NotificationSink for NotificationHub {
    fn name(&self) -> &str {
        "sse-hub"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), SubscriberError> {
        self.broadcast(notification.clone());
        Ok(())
    }
}
