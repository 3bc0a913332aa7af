//! Notification fan-out.
//!
//! In-process publish/subscribe with typed notifications. Delivery is
//! synchronous, at-most-once and in registration order. A failing or
//! panicking handler is logged and skipped; it never stops delivery to the
//! handlers registered after it and never reaches the publisher.
//!
//! Consumers that must not stall the publisher subscribe through
//! [`NotificationFanout::subscribe_queue`], which gives each of them a
//! private unbounded queue. Publish order is preserved per queue.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{Notification, NotificationKind, NotificationPayload};

/// Failure reported by a subscriber. Never propagated to the publisher.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The subscriber is gone; its registration is dropped.
    #[error("Subscriber closed")]
    Closed,

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Synchronous notification handler.
pub type NotificationHandler =
    Arc<dyn Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync>;

/// Asynchronous consumer fed from a [`NotificationQueue`].
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Deliver one notification.
    async fn deliver(&self, notification: &Notification) -> Result<(), SubscriberError>;
}

#[derive(Debug, Clone)]
enum Interest {
    All,
    Only(Vec<NotificationKind>),
}

impl Interest {
    fn includes(&self, kind: NotificationKind) -> bool {
        match self {
            Interest::All => true,
            Interest::Only(kinds) => kinds.contains(&kind),
        }
    }
}

struct Registration {
    id: u64,
    interest: Interest,
    handler: NotificationHandler,
}

struct FanoutInner {
    /// Registration order is delivery order
    subscribers: RwLock<Vec<Arc<Registration>>>,
    next_subscriber: AtomicU64,
    /// Held while stamping and delivering; the value is the last sequence
    delivery: Mutex<u64>,
}

impl FanoutInner {
    fn remove(&self, id: u64) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|r| r.id != id);
        subscribers.len() != before
    }
}

/// Typed publish/subscribe hub. Cloning yields another handle to the same hub.
#[derive(Clone)]
pub struct NotificationFanout {
    inner: Arc<FanoutInner>,
}

impl NotificationFanout {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                subscribers: RwLock::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
                delivery: Mutex::new(0),
            }),
        }
    }

    /// Register a handler for one notification kind.
    pub fn subscribe<F>(&self, kind: NotificationKind, handler: F) -> Subscription
    where
        F: Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.register(Interest::Only(vec![kind]), Arc::new(handler))
    }

    /// Register a handler for every notification kind.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.register(Interest::All, Arc::new(handler))
    }

    /// Register a private queue receiving the given kinds.
    pub fn subscribe_queue(&self, kinds: &[NotificationKind]) -> NotificationQueue {
        self.queue(Interest::Only(kinds.to_vec()))
    }

    /// Register a private queue receiving every kind.
    pub fn subscribe_all_queue(&self) -> NotificationQueue {
        self.queue(Interest::All)
    }

    fn queue(&self, interest: Interest) -> NotificationQueue {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: NotificationHandler = Arc::new(move |notification: &Notification| {
            tx.send(notification.clone())
                .map_err(|_| SubscriberError::Closed)
        });
        let subscription = self.register(interest, handler);
        NotificationQueue { rx, subscription }
    }

    fn register(&self, interest: Interest, handler: NotificationHandler) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let registration = Arc::new(Registration {
            id,
            interest,
            handler,
        });

        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);

        debug!(subscriber_id = id, "Subscriber registered");

        Subscription {
            id,
            fanout: Arc::downgrade(&self.inner),
        }
    }

    /// Stamp and deliver a notification to every interested subscriber.
    ///
    /// Publishes are serialized: every subscriber sees notifications in
    /// sequence order. Handlers must not publish on the same fan-out.
    pub fn publish(&self, kind: NotificationKind, payload: NotificationPayload) -> Notification {
        let mut last = self
            .inner
            .delivery
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last += 1;

        let notification = Notification {
            id: uuid::Uuid::new_v4(),
            sequence: *last,
            kind,
            payload,
            created_at: Utc::now(),
        };

        // Snapshot so handlers may (un)subscribe without deadlocking.
        let targets: Vec<Arc<Registration>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.interest.includes(kind))
            .cloned()
            .collect();

        let mut closed = Vec::new();
        for registration in &targets {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| (registration.handler)(&notification)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(SubscriberError::Closed)) => closed.push(registration.id),
                Ok(Err(e)) => {
                    warn!(
                        subscriber_id = registration.id,
                        kind = %kind,
                        sequence = notification.sequence,
                        error = %e,
                        "Subscriber failed to handle notification"
                    );
                }
                Err(_) => {
                    warn!(
                        subscriber_id = registration.id,
                        kind = %kind,
                        sequence = notification.sequence,
                        "Subscriber panicked while handling notification"
                    );
                }
            }
        }

        for id in closed {
            if self.inner.remove(id) {
                debug!(subscriber_id = id, "Dropped closed subscriber");
            }
        }

        debug!(
            kind = %kind,
            sequence = notification.sequence,
            report_id = %notification.payload.report_id,
            delivered_to = targets.len(),
            "Notification published"
        );

        notification
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for NotificationFanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposer returned by the subscribe calls.
///
/// Dropping it leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    fanout: Weak<FanoutInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.fanout.upgrade() {
            Some(inner) => inner.remove(self.id),
            None => false,
        }
    }
}

/// Per-subscriber ordered queue.
pub struct NotificationQueue {
    rx: mpsc::UnboundedReceiver<Notification>,
    subscription: Subscription,
}

impl NotificationQueue {
    /// Wait for the next notification. `None` once the fan-out is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take the next notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) -> bool {
        self.subscription.unsubscribe()
    }

    /// Drain the queue into `sink` until the fan-out is dropped.
    ///
    /// Each delivery is bounded by `timeout`; a timed-out or failed delivery
    /// is logged and the next notification is processed.
    pub async fn forward_to<S>(mut self, sink: S, timeout: Duration)
    where
        S: NotificationSink,
    {
        while let Some(notification) = self.rx.recv().await {
            let result = match tokio::time::timeout(timeout, sink.deliver(&notification)).await {
                Ok(result) => result,
                Err(_) => Err(SubscriberError::Timeout(timeout)),
            };

            if let Err(e) = result {
                warn!(
                    sink = sink.name(),
                    kind = %notification.kind,
                    sequence = notification.sequence,
                    error = %e,
                    "Sink delivery failed"
                );
            }
        }

        debug!(sink = sink.name(), "Notification queue closed");
    }
}
