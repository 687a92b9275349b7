// ============================================================================
// Messaging - Broker Channel Adapters
// ============================================================================
//
// The broker is a collaborator, not part of the event core. Everything the
// core needs from it is captured by `BrokerChannel`:
// - publish a serialized payload to a named channel (acknowledged or failed)
// - open a subscription that yields raw payloads until the connection drops
//
// Each delivered message must be acked once its handler finished; brokers with
// consumer offsets only advance past acked messages.
//
// A subscription stream that ends (`None`) means the connection was lost;
// the subscriber is expected to reconnect. Delivery is at-least-once to
// connected subscribers with no ordering guarantee across reconnects.
//
// Adapters:
// - RedisBroker     - Redis pub/sub (default deployment)
// - RedpandaBroker  - Kafka-compatible, durable consumer groups
// - InMemoryBroker  - in-process, used by tests
//
// ============================================================================

mod memory;
mod redis_broker;
mod redpanda;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

use crate::config::{BrokerConfig, BrokerKind};
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

pub use self::memory::InMemoryBroker;
pub use self::redis_broker::RedisBroker;
pub use self::redpanda::RedpandaBroker;

/// Channel all customer lifecycle events are published on
pub const CUSTOMER_EVENTS_CHANNEL: &str = "customer-events";

/// Messages delivered by a subscription
pub type MessageStream = BoxStream<'static, Result<Delivery, MessagingError>>;

type AckFn = Box<dyn FnOnce() + Send>;

/// One raw payload plus, for brokers that track consumer progress, the hook
/// that marks it handled. A delivery dropped without `ack` stays eligible for
/// redelivery after a restart.
pub struct Delivery {
    payload: String,
    ack: Option<AckFn>,
}

impl Delivery {
    /// Payload from a transport with nothing to acknowledge (pub/sub)
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ack: None,
        }
    }

    pub fn with_ack(payload: impl Into<String>, ack: impl FnOnce() + Send + 'static) -> Self {
        Self {
            payload: payload.into(),
            ack: Some(Box::new(ack)),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    pub fn ack(self) {
        if let Some(ack) = self.ack {
            ack();
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload", &self.payload)
            .field("ack", &self.ack.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("publish to '{channel}' failed: {reason}")]
    Publish { channel: String, reason: String },

    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("undeliverable message on '{channel}': {reason}")]
    Delivery { channel: String, reason: String },

    #[error("event encoding failed: {0}")]
    Encode(String),

    #[error("broker circuit breaker open")]
    CircuitOpen,
}

impl IsTransient for MessagingError {
    fn is_transient(&self) -> bool {
        !matches!(
            self,
            MessagingError::Delivery { .. } | MessagingError::Encode(_)
        )
    }
}

/// Publish/subscribe transport used by both services.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Write `payload` to `channel`; resolves once the broker acknowledged it.
    /// `key` identifies the subject; adapters with partitions use it to keep
    /// one subject's events together.
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), MessagingError>;

    /// Open a new subscription on `channel` using its own connection.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, MessagingError>;

    /// Adapter name for logs and health reports
    fn name(&self) -> &'static str;
}

/// Build the adapter selected by configuration, retrying while the broker
/// is still starting up.
pub async fn connect(config: &BrokerConfig) -> Result<Arc<dyn BrokerChannel>, MessagingError> {
    match config.kind {
        BrokerKind::Redis => {
            let url = config.redis_url.as_str();
            let broker = retry_on_transient(RetryConfig::startup(), move |_attempt| {
                RedisBroker::connect(url)
            })
            .await
            .into_result()?;
            Ok(Arc::new(broker))
        }
        BrokerKind::Redpanda => {
            let broker = RedpandaBroker::new(&config.redpanda_brokers, &config.consumer_group)?;
            Ok(Arc::new(broker))
        }
    }
}
