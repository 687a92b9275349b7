use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{BrokerChannel, Delivery, MessageStream, MessagingError};

// ============================================================================
// In-Memory Broker
// ============================================================================
//
// One broadcast channel per channel name. Lets tests exercise the same
// contract as the real adapters, including:
// - duplicate delivery (`redeliver`)
// - connection loss (`drop_connections` ends every open subscription)
// - broker outage (`set_unavailable` fails publishes and subscribes)
//
// ============================================================================

const CHANNEL_CAPACITY: usize = 1024;

pub struct InMemoryBroker {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    unavailable: AtomicBool,
    published: AtomicUsize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            published: AtomicUsize::new(0),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Simulate the broker going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// End every open subscription, as if the broker connection dropped
    pub fn drop_connections(&self) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.clear();
    }

    /// Deliver a raw payload to current subscribers without counting it as a publish
    pub fn redeliver(&self, channel: &str, payload: &str) -> usize {
        self.sender(channel).send(payload.to_string()).unwrap_or(0)
    }

    /// Number of subscribers currently attached to `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.sender(channel).receiver_count()
    }

    /// Number of successful publishes so far
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn publish(&self, channel: &str, _key: &str, payload: &str) -> Result<(), MessagingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MessagingError::Publish {
                channel: channel.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        // No subscribers is not an error, mirroring Redis pub/sub.
        let _ = self.sender(channel).send(payload.to_string());
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, MessagingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MessagingError::Connection("broker unavailable".to_string()));
        }

        let receiver = self.sender(channel).subscribe();
        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((Ok(Delivery::new(payload)), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "In-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(messages.boxed())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_payload() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe("customer-events").await.unwrap();

        broker.publish("customer-events", "1", "hello").await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.payload(), "hello");
        assert_eq!(broker.published_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let broker = InMemoryBroker::new();
        assert!(broker.publish("customer-events", "1", "lost").await.is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_broker_rejects_publish_and_subscribe() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        let publish = broker.publish("customer-events", "1", "x").await;
        assert!(matches!(publish, Err(MessagingError::Publish { .. })));

        let subscribe = broker.subscribe("customer-events").await;
        assert!(matches!(subscribe, Err(MessagingError::Connection(_))));
        assert_eq!(broker.published_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_connections_ends_subscription() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe("customer-events").await.unwrap();

        broker.drop_connections();

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_redeliver_duplicates_payload() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe("customer-events").await.unwrap();

        broker.publish("customer-events", "1", "dup").await.unwrap();
        assert_eq!(broker.redeliver("customer-events", "dup"), 1);

        assert_eq!(stream.next().await.unwrap().unwrap().payload(), "dup");
        assert_eq!(stream.next().await.unwrap().unwrap().payload(), "dup");
        assert_eq!(broker.published_count(), 1);
    }
}
