use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::{BrokerChannel, Delivery, MessageStream, MessagingError};

// ============================================================================
// Redis Pub/Sub Broker
// ============================================================================
//
// Publishing goes through one multiplexed connection created at startup.
// Every subscription gets a dedicated pub/sub connection, since a Redis
// connection in subscribe mode cannot issue regular commands.
//
// Redis pub/sub only reaches subscribers connected at publish time; a publish
// that reached nobody is logged so the gap is visible.
//
// ============================================================================

pub struct RedisBroker {
    client: redis::Client,
    publisher: MultiplexedConnection,
}

impl RedisBroker {
    /// Open the client and the shared publishing connection.
    pub async fn connect(url: &str) -> Result<Self, MessagingError> {
        let client = redis::Client::open(url)
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        tracing::info!("🔌 Connected to Redis");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl BrokerChannel for RedisBroker {
    async fn publish(&self, channel: &str, _key: &str, payload: &str) -> Result<(), MessagingError> {
        let mut conn = self.publisher.clone();

        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| MessagingError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        if receivers == 0 {
            tracing::warn!(
                channel = %channel,
                "Published to Redis but no subscriber was connected"
            );
        } else {
            tracing::debug!(channel = %channel, receivers = receivers, "Published to Redis");
        }

        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, MessagingError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| MessagingError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(channel = %channel, "📡 Redis subscription established");

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().map(move |msg| {
            msg.get_payload::<String>()
                .map(Delivery::new)
                .map_err(|e| MessagingError::Delivery {
                    channel: channel.clone(),
                    reason: e.to_string(),
                })
        });

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
