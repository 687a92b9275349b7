use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BrokerChannel, Delivery, MessageStream, MessagingError};

// ============================================================================
// Redpanda Broker - Kafka-compatible alternative to Redis pub/sub
// ============================================================================
//
// Unlike Redis pub/sub, a consumer group keeps its offset across restarts, so
// events published while the loyalty service was down are delivered when it
// comes back.
//
// Offsets are stored by hand and auto-committed. A message's offset only
// becomes committable once its handler acked it and every earlier message on
// the same partition was acked too, so work aborted at shutdown (or a handler
// that failed) is delivered again after a restart: at-least-once.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaBroker {
    producer: FutureProducer,
    brokers: String,
    consumer_group: String,
}

impl RedpandaBroker {
    pub fn new(brokers: &str, consumer_group: &str) -> Result<Self, MessagingError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .map_err(|e| MessagingError::Connection(e.to_string()))?;

        tracing::info!(brokers = %brokers, "🔌 Redpanda producer created");

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            consumer_group: consumer_group.to_string(),
        })
    }

    fn consumer(&self) -> Result<StreamConsumer, MessagingError> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .create()
            .map_err(|e| MessagingError::Connection(e.to_string()))
    }
}

// ============================================================================
// Offset tracking
// ============================================================================

/// Handled-message bookkeeping for one partition.
#[derive(Debug, Default)]
struct PartitionProgress {
    in_flight: BTreeSet<i64>,
    highest_done: Option<i64>,
}

impl PartitionProgress {
    fn track(&mut self, offset: i64) {
        self.in_flight.insert(offset);
    }

    /// Mark `offset` handled; returns the position that is now safe to commit.
    fn complete(&mut self, offset: i64) -> i64 {
        self.in_flight.remove(&offset);
        self.highest_done = Some(self.highest_done.map_or(offset, |done| done.max(offset)));

        match (self.in_flight.first(), self.highest_done) {
            (Some(&pending), _) => pending,
            (None, Some(done)) => done + 1,
            (None, None) => offset + 1,
        }
    }
}

#[derive(Default)]
struct OffsetTracker {
    partitions: Mutex<HashMap<i32, PartitionProgress>>,
}

impl OffsetTracker {
    fn track(&self, partition: i32, offset: i64) {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        partitions.entry(partition).or_default().track(offset);
    }

    fn complete(&self, partition: i32, offset: i64) -> i64 {
        let mut partitions = self
            .partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        partitions.entry(partition).or_default().complete(offset)
    }
}

fn store_committable(
    consumer: &StreamConsumer,
    tracker: &OffsetTracker,
    topic: &str,
    partition: i32,
    offset: i64,
) {
    let next = tracker.complete(partition, offset);

    let mut positions = TopicPartitionList::new();
    let stored = positions
        .add_partition_offset(topic, partition, Offset::Offset(next))
        .and_then(|_| consumer.store_offsets(&positions));

    match stored {
        Ok(()) => tracing::debug!(
            topic = %topic,
            partition = partition,
            offset = offset,
            committable = next,
            "Stored consumer offset"
        ),
        Err(e) => tracing::warn!(
            topic = %topic,
            partition = partition,
            offset = offset,
            error = %e,
            "Failed to store consumer offset"
        ),
    }
}

#[async_trait]
impl BrokerChannel for RedpandaBroker {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), MessagingError> {
        let record = FutureRecord::to(channel).key(key).payload(payload);

        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| MessagingError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(topic = %channel, key = %key, "Published to Redpanda");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, MessagingError> {
        let consumer = self.consumer()?;

        consumer
            .subscribe(&[channel])
            .map_err(|e| MessagingError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            topic = %channel,
            group = %self.consumer_group,
            "📡 Redpanda subscription established"
        );

        let consumer = Arc::new(consumer);
        let tracker = Arc::new(OffsetTracker::default());
        let topic = channel.to_string();

        let messages = stream::unfold(
            (consumer, tracker, topic),
            |(consumer, tracker, topic)| async move {
                let item = match consumer.recv().await {
                    Ok(message) => {
                        let partition = message.partition();
                        let offset = message.offset();
                        tracker.track(partition, offset);

                        let ack = {
                            let consumer = consumer.clone();
                            let tracker = tracker.clone();
                            let topic = topic.clone();
                            move || store_committable(&consumer, &tracker, &topic, partition, offset)
                        };

                        match message.payload_view::<str>() {
                            Some(Ok(payload)) => Ok(Delivery::with_ack(payload, ack)),
                            Some(Err(e)) => {
                                ack();
                                Err(MessagingError::Delivery {
                                    channel: topic.clone(),
                                    reason: format!("payload is not UTF-8: {e}"),
                                })
                            }
                            None => {
                                ack();
                                Err(MessagingError::Delivery {
                                    channel: topic.clone(),
                                    reason: "empty payload".to_string(),
                                })
                            }
                        }
                    }
                    Err(e) => Err(MessagingError::Subscribe {
                        channel: topic.clone(),
                        reason: e.to_string(),
                    }),
                };
                Some((item, (consumer, tracker, topic)))
            },
        );

        Ok(messages.boxed())
    }

    fn name(&self) -> &'static str {
        "redpanda"
    }
}
