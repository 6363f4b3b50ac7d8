use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, trace};

use crate::types::ServiceStatus;

/// Updates buffered per subscriber before new ones are dropped
pub const SUBSCRIBER_CAPACITY: usize = 100;

/// Handle returned by [`Broadcaster::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Arc<ServiceStatus>>,
}

/// Fan-out of status updates to live subscribers.
///
/// Publishing never waits: a subscriber whose buffer is full simply misses the
/// update.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: RwLock<Vec<(u64, mpsc::Sender<Arc<ServiceStatus>>)>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.push((id, tx));
        debug!(subscriber = id, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber and close its channel. Returns `false` if it was
    /// not registered.
    pub async fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|(subscriber, _)| *subscriber != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    pub async fn publish(&self, status: Arc<ServiceStatus>) {
        let subscribers = self.subscribers.read().await;
        for (id, tx) in subscribers.iter() {
            if let Err(e) = tx.try_send(status.clone()) {
                trace!(subscriber = id, service = %status.name, reason = %e, "Dropped update");
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    fn update(name: &str) -> Arc<ServiceStatus> {
        Arc::new(ServiceStatus {
            name: name.to_string(),
            group: String::new(),
            url: String::new(),
            description: String::new(),
            status: Status::Operational,
            response_time_ms: 1,
            status_code: 200,
            last_check: None,
            uptime: 100.0,
            error_message: String::new(),
            history: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_updates_in_order() {
        let hub = Broadcaster::new();
        let mut first = hub.subscribe().await;
        let mut second = hub.subscribe().await;
        assert_ne!(first.id, second.id);

        hub.publish(update("a")).await;
        hub.publish(update("b")).await;

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.receiver.recv().await.unwrap().name, "a");
            assert_eq!(sub.receiver.recv().await.unwrap().name, "b");
        }
    }

    #[tokio::test]
    async fn test_full_subscriber_drops_without_blocking() {
        let hub = Broadcaster::new();
        let mut idle = hub.subscribe().await;

        for i in 0..(SUBSCRIBER_CAPACITY + 25) {
            hub.publish(update(&format!("svc-{i}"))).await;
        }

        let mut received = Vec::new();
        while let Ok(status) = idle.receiver.try_recv() {
            received.push(status.name.clone());
        }
        assert_eq!(received.len(), SUBSCRIBER_CAPACITY);
        assert_eq!(received.first().map(String::as_str), Some("svc-0"));
        assert_eq!(received.last().map(String::as_str), Some("svc-99"));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_channel() {
        let hub = Broadcaster::new();
        let mut sub = hub.subscribe().await;

        assert!(hub.unsubscribe(sub.id).await);
        assert!(!hub.unsubscribe(sub.id).await);
        assert_eq!(hub.subscriber_count().await, 0);

        hub.publish(update("after")).await;
        assert!(sub.receiver.recv().await.is_none());
    }
}
