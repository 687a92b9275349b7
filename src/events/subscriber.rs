use futures_util::StreamExt;
use kameo::actor::ActorRef;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::envelope::{decode, DecodeError, ReceivedEvent};
use super::handlers::ReconciliationHandlers;
use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::messaging::{BrokerChannel, Delivery, MessagingError};
use crate::metrics::Metrics;
use crate::utils::{Backoff, RetryConfig};

// ============================================================================
// Event Subscriber - Loyalty service side
// ============================================================================
//
// Holds one long-lived subscription to the customer event channel and routes
// every decoded event to the reconciliation handlers.
//
//   Disconnected ──subscribe ok──▶ Listening
//        ▲                              │
//        └──── stream ended / error ────┘   (reconnect with backoff)
//
// - Handlers run on a JoinSet, never on the delivery loop; a failed or
//   panicking handler is logged and the loop keeps going.
// - Malformed messages and unknown event types are logged and dropped.
// - On shutdown the subscription is closed first, then in-flight handlers get
//   a grace period before being aborted. Aborted work counts as "maybe
//   applied"; redelivery after restart is the recovery path.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Listening,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Disconnected => "disconnected",
            SubscriptionState::Listening => "listening",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub channel: String,
    pub reconnect: RetryConfig,
    /// How long in-flight handlers may keep running after shutdown starts
    pub shutdown_grace: Duration,
}

impl SubscriberConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            reconnect: RetryConfig::reconnect(Duration::from_millis(500), Duration::from_secs(30)),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

pub struct EventSubscriber {
    broker: Arc<dyn BrokerChannel>,
    handlers: Arc<ReconciliationHandlers>,
    metrics: Arc<Metrics>,
    config: SubscriberConfig,
    state: watch::Sender<SubscriptionState>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

impl EventSubscriber {
    pub fn new(
        broker: Arc<dyn BrokerChannel>,
        handlers: Arc<ReconciliationHandlers>,
        metrics: Arc<Metrics>,
        config: SubscriberConfig,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Disconnected);
        metrics.set_subscription_state(false);

        Self {
            broker,
            handlers,
            metrics,
            config,
            state,
            health: None,
        }
    }

    /// Report subscription state changes to the health monitor
    pub fn with_health_monitor(mut self, monitor: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(monitor);
        self
    }

    /// Watch the subscription state; take this before calling `run`.
    pub fn state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Subscribe and dispatch until `shutdown` flips to `true` (or its sender
    /// is dropped). Connection loss never ends this loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let channel = self.config.channel.clone();
        let mut backoff = self.config.reconnect.backoff();
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut connected_before = false;

        tracing::info!(
            channel = %channel,
            broker = self.broker.name(),
            "Starting event subscriber"
        );

        self.transition(SubscriptionState::Disconnected).await;

        'reconnect: loop {
            if *shutdown.borrow() {
                break;
            }

            let mut messages = match self.broker.subscribe(&channel).await {
                Ok(messages) => messages,
                Err(e) => {
                    if self
                        .wait_before_retry(&mut backoff, &e, &mut shutdown)
                        .await
                    {
                        break 'reconnect;
                    }
                    continue 'reconnect;
                }
            };

            if connected_before {
                self.metrics.record_reconnect();
                tracing::info!(
                    channel = %channel,
                    attempts = backoff.attempts(),
                    "🔁 Event subscription re-established"
                );
            }
            connected_before = true;
            backoff.reset();
            self.transition(SubscriptionState::Listening).await;
            tracing::info!(channel = %channel, "🎯 Listening for customer events");

            let lost = loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'reconnect;
                        }
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            if e.is_panic() {
                                tracing::error!(error = %e, "Event handler panicked");
                            }
                        }
                    }
                    message = messages.next() => match message {
                        Some(Ok(delivery)) => self.dispatch(delivery, &mut in_flight),
                        Some(Err(MessagingError::Delivery { reason, .. })) => {
                            self.metrics.record_dropped("undeliverable");
                            tracing::warn!(
                                channel = %channel,
                                error = %reason,
                                "Dropping undeliverable message"
                            );
                        }
                        Some(Err(e)) => break e,
                        None => break MessagingError::Connection("subscription stream ended".to_string()),
                    },
                }
            };

            drop(messages);
            self.transition(SubscriptionState::Disconnected).await;

            if self
                .wait_before_retry(&mut backoff, &lost, &mut shutdown)
                .await
            {
                break 'reconnect;
            }
        }

        tracing::info!(channel = %channel, "🛑 Closing event subscription");
        self.transition(SubscriptionState::Disconnected).await;
        self.drain(in_flight).await;
    }

    /// Decode one payload and hand it to a handler task.
    ///
    /// Dropped messages are acked right away. A handled message is acked only
    /// when its handler succeeded; failed or aborted handlers leave it for
    /// redelivery.
    fn dispatch(&self, delivery: Delivery, in_flight: &mut JoinSet<()>) {
        let received = match decode(delivery.payload()) {
            Ok(received) => received,
            Err(DecodeError::UnknownType(event_type)) => {
                self.metrics.record_dropped("unknown_type");
                tracing::info!(event_type = %event_type, "Ignoring unknown event type");
                delivery.ack();
                return;
            }
            Err(e) => {
                self.metrics.record_dropped(e.reason());
                tracing::warn!(
                    error = %e,
                    payload_len = delivery.payload().len(),
                    "Dropping message that is not a valid customer event"
                );
                delivery.ack();
                return;
            }
        };

        let ReceivedEvent {
            event,
            emitted_at,
            producer,
        } = received;
        let event_type = event.kind().as_wire();
        self.metrics.record_received(event_type);

        tracing::debug!(
            event_type = event_type,
            customer_id = %event.customer_id(),
            producer = %producer,
            emitted_at = %emitted_at,
            "📥 Received customer event"
        );

        let handlers = self.handlers.clone();
        let metrics = self.metrics.clone();

        in_flight.spawn(async move {
            let started = Instant::now();
            match handlers.handle(&event).await {
                Ok(outcome) => {
                    metrics.record_handler(
                        event_type,
                        outcome.as_str(),
                        started.elapsed().as_secs_f64(),
                    );
                    delivery.ack();
                }
                Err(e) => {
                    metrics.record_handler_failure(event_type, started.elapsed().as_secs_f64());
                    tracing::error!(
                        event_type = event_type,
                        customer_id = %event.customer_id(),
                        error = %e,
                        "❌ Event handler failed"
                    );
                }
            }
        });
    }

    /// Sleep for the next backoff delay; `true` if shutdown was requested meanwhile.
    async fn wait_before_retry(
        &self,
        backoff: &mut Backoff,
        error: &MessagingError,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let delay = backoff.next_delay();
        tracing::warn!(
            channel = %self.config.channel,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Event subscription unavailable, reconnecting"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => *shutdown.borrow(),
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        tracing::info!(
            in_flight = in_flight.len(),
            grace_secs = self.config.shutdown_grace.as_secs(),
            "Waiting for in-flight event handlers"
        );

        let finished = tokio::time::timeout(self.config.shutdown_grace, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            tracing::warn!(
                abandoned = in_flight.len(),
                "Shutdown grace elapsed, aborting handlers (effects may be partially applied)"
            );
            in_flight.abort_all();
        }
    }

    async fn transition(&self, next: SubscriptionState) {
        let previous = self.state.send_replace(next);
        self.metrics
            .set_subscription_state(next == SubscriptionState::Listening);

        if previous != next {
            tracing::debug!(
                from = previous.as_str(),
                to = next.as_str(),
                "Subscription state changed"
            );
        }

        if let Some(monitor) = &self.health {
            let status = match next {
                SubscriptionState::Listening => HealthStatus::Healthy,
                SubscriptionState::Disconnected => {
                    HealthStatus::Unhealthy("Event subscription disconnected".to_string())
                }
            };
            let _ = monitor
                .tell(UpdateHealth {
                    component: "subscription".to_string(),
                    status,
                    details: Some(self.config.channel.clone()),
                })
                .send()
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::domain::customer::CustomerId;
    use crate::domain::loyalty::{InMemoryLedgerStore, LedgerStore, LoyaltyAccount};
    use crate::messaging::{InMemoryBroker, MessageStream};
    use async_trait::async_trait;
    use futures_util::stream;
    use serde_json::json;
    use std::sync::Mutex;

    const CHANNEL: &str = "customer-events";

    struct Harness {
        broker: Arc<InMemoryBroker>,
        ledger: Arc<InMemoryLedgerStore>,
        metrics: Arc<Metrics>,
        state: watch::Receiver<SubscriptionState>,
        shutdown: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start() -> Harness {
        let broker = Arc::new(InMemoryBroker::new());
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut config = SubscriberConfig::new(CHANNEL);
        config.reconnect = RetryConfig::reconnect(Duration::from_millis(5), Duration::from_millis(20));
        config.shutdown_grace = Duration::from_millis(200);

        let subscriber = EventSubscriber::new(
            broker.clone(),
            Arc::new(ReconciliationHandlers::new(ledger.clone())),
            metrics.clone(),
            config,
        );
        let state = subscriber.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(subscriber.run(shutdown_rx));

        Harness {
            broker,
            ledger,
            metrics,
            state,
            shutdown,
            task,
        }
    }

    fn created(id: i64, opt_in: bool) -> String {
        json!({
            "type": "user:created",
            "data": { "id": id, "name": "Ada", "email": "ada@example.com", "fidelity_opt_in": opt_in },
            "timestamp": "2024-05-01T12:00:00Z",
            "service": "customer-service",
        })
        .to_string()
    }

    async fn listening(state: &mut watch::Receiver<SubscriptionState>) {
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == SubscriptionState::Listening),
        )
        .await
        .unwrap()
        .unwrap();
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_dispatches_created_event() {
        let mut h = start();
        listening(&mut h.state).await;

        h.broker.redeliver(CHANNEL, &created(1, true));

        let ledger = h.ledger.clone();
        eventually(|| {
            let ledger = ledger.clone();
            async move { ledger.find_by_customer_id(CustomerId(1)).await.unwrap().is_some() }
        })
        .await;

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_messages_do_not_stop_the_loop() {
        let mut h = start();
        listening(&mut h.state).await;

        h.broker.redeliver(CHANNEL, "{ not json");
        h.broker.redeliver(CHANNEL, r#"{"type":"user:archived","data":{"id":1},"timestamp":"2024-05-01T12:00:00Z","service":"x"}"#);
        h.broker.redeliver(CHANNEL, &created(2, true));

        let ledger = h.ledger.clone();
        eventually(|| {
            let ledger = ledger.clone();
            async move { ledger.len().await == 1 }
        })
        .await;

        assert_eq!(h.metrics.events_dropped.with_label_values(&["malformed"]).get(), 1);
        assert_eq!(h.metrics.events_dropped.with_label_values(&["unknown_type"]).get(), 1);
        assert_eq!(*h.state.borrow(), SubscriptionState::Listening);

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_loss() {
        let mut h = start();
        listening(&mut h.state).await;

        h.broker.drop_connections();

        eventually(|| {
            let metrics = h.metrics.clone();
            async move { metrics.subscription_reconnects.get() == 1 }
        })
        .await;
        listening(&mut h.state).await;
        assert_eq!(h.broker.subscriber_count(CHANNEL), 1);

        h.broker.redeliver(CHANNEL, &created(3, true));
        let ledger = h.ledger.clone();
        eventually(|| {
            let ledger = ledger.clone();
            async move { ledger.find_by_customer_id(CustomerId(3)).await.unwrap().is_some() }
        })
        .await;

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_until_broker_is_reachable() {
        let broker_down = Arc::new(InMemoryBroker::new());
        broker_down.set_unavailable(true);

        let ledger = Arc::new(InMemoryLedgerStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut config = SubscriberConfig::new(CHANNEL);
        config.reconnect = RetryConfig::reconnect(Duration::from_millis(5), Duration::from_millis(10));
        let subscriber = EventSubscriber::new(
            broker_down.clone(),
            Arc::new(ReconciliationHandlers::new(ledger)),
            metrics,
            config,
        );
        let mut state = subscriber.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(subscriber.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*state.borrow(), SubscriptionState::Disconnected);

        broker_down.set_unavailable(false);
        listening(&mut state).await;

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_failure_is_contained() {
        let mut h = start();
        listening(&mut h.state).await;

        h.ledger.set_unavailable(true);
        h.broker.redeliver(CHANNEL, &created(4, true));

        let metrics = h.metrics.clone();
        eventually(|| {
            let metrics = metrics.clone();
            async move { metrics.handler_failures.with_label_values(&["user:created"]).get() == 1 }
        })
        .await;

        h.ledger.set_unavailable(false);
        h.broker.redeliver(CHANNEL, &created(4, true));

        let ledger = h.ledger.clone();
        eventually(|| {
            let ledger = ledger.clone();
            async move { ledger.find_by_customer_id(CustomerId(4)).await.unwrap().is_some() }
        })
        .await;

        h.shutdown.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscription() {
        let mut h = start();
        listening(&mut h.state).await;

        h.shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*h.state.borrow(), SubscriptionState::Disconnected);
        assert_eq!(h.broker.subscriber_count(CHANNEL), 0);
        assert_eq!(h.metrics.subscription_state.get(), 0);
    }

    // ------------------------------------------------------------------------
    // Acknowledgement and shutdown drain
    // ------------------------------------------------------------------------

    type Acks = Arc<Mutex<Vec<&'static str>>>;

    /// Broker that hands out a fixed batch on the first subscription, then idles
    struct ScriptedBroker {
        batch: Mutex<Vec<Delivery>>,
    }

    #[async_trait]
    impl BrokerChannel for ScriptedBroker {
        async fn publish(&self, _channel: &str, _key: &str, _payload: &str) -> Result<(), MessagingError> {
            Ok(())
        }

        async fn subscribe(&self, _channel: &str) -> Result<MessageStream, MessagingError> {
            let batch = std::mem::take(&mut *self.batch.lock().unwrap());
            Ok(stream::iter(batch.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    /// In-memory ledger with slow account creation and an optional failing customer
    struct SlowLedger {
        inner: Arc<InMemoryLedgerStore>,
        delay: Duration,
        failing: Option<CustomerId>,
    }

    #[async_trait]
    impl LedgerStore for SlowLedger {
        async fn find_by_customer_id(
            &self,
            customer_id: CustomerId,
        ) -> Result<Option<LoyaltyAccount>, StoreError> {
            self.inner.find_by_customer_id(customer_id).await
        }

        async fn create(
            &self,
            customer_id: CustomerId,
            initial_points: i64,
        ) -> Result<Option<LoyaltyAccount>, StoreError> {
            tokio::time::sleep(self.delay).await;
            if self.failing == Some(customer_id) {
                return Err(StoreError::Unavailable("ledger write timed out".to_string()));
            }
            self.inner.create(customer_id, initial_points).await
        }

        async fn add_points(
            &self,
            customer_id: CustomerId,
            amount: i64,
        ) -> Result<Option<LoyaltyAccount>, StoreError> {
            self.inner.add_points(customer_id, amount).await
        }

        async fn delete(
            &self,
            customer_id: CustomerId,
        ) -> Result<Option<LoyaltyAccount>, StoreError> {
            self.inner.delete(customer_id).await
        }

        async fn list(&self, limit: i64, offset: i64) -> Result<Vec<LoyaltyAccount>, StoreError> {
            self.inner.list(limit, offset).await
        }

        async fn count(&self) -> Result<i64, StoreError> {
            self.inner.count().await
        }
    }

    fn tracked(label: &'static str, payload: String, acks: &Acks) -> Delivery {
        let acks = acks.clone();
        Delivery::with_ack(payload, move || acks.lock().unwrap().push(label))
    }

    fn run_scripted(
        batch: Vec<Delivery>,
        ledger: SlowLedger,
        grace: Duration,
    ) -> (
        watch::Receiver<SubscriptionState>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let mut config = SubscriberConfig::new(CHANNEL);
        config.shutdown_grace = grace;

        let subscriber = EventSubscriber::new(
            Arc::new(ScriptedBroker {
                batch: Mutex::new(batch),
            }),
            Arc::new(ReconciliationHandlers::new(Arc::new(ledger))),
            Arc::new(Metrics::new().unwrap()),
            config,
        );
        let state = subscriber.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        (state, shutdown, tokio::spawn(subscriber.run(shutdown_rx)))
    }

    #[tokio::test]
    async fn test_acks_handled_and_dropped_messages_but_not_failures() {
        let acks: Acks = Arc::default();
        let inner = Arc::new(InMemoryLedgerStore::new());
        let ledger = SlowLedger {
            inner: inner.clone(),
            delay: Duration::ZERO,
            failing: Some(CustomerId(7)),
        };
        let batch = vec![
            tracked("enrolled", created(6, true), &acks),
            tracked("malformed", "{ nope".to_string(), &acks),
            tracked("failed", created(7, true), &acks),
        ];

        let (mut state, shutdown, task) = run_scripted(batch, ledger, Duration::from_secs(1));
        listening(&mut state).await;

        let seen = acks.clone();
        eventually(|| {
            let seen = seen.clone();
            async move { seen.lock().unwrap().len() == 2 }
        })
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut labels = acks.lock().unwrap().clone();
        labels.sort();
        assert_eq!(labels, vec!["enrolled", "malformed"]);
        assert!(inner.find_by_customer_id(CustomerId(6)).await.unwrap().is_some());
        assert!(inner.find_by_customer_id(CustomerId(7)).await.unwrap().is_none());

        shutdown.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_handler_finish_within_grace() {
        let acks: Acks = Arc::default();
        let inner = Arc::new(InMemoryLedgerStore::new());
        let ledger = SlowLedger {
            inner: inner.clone(),
            delay: Duration::from_millis(200),
            failing: None,
        };

        let (mut state, shutdown, task) = run_scripted(
            vec![tracked("slow", created(8, true), &acks)],
            ledger,
            Duration::from_secs(2),
        );
        listening(&mut state).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .unwrap()
            .unwrap();

        assert!(inner.find_by_customer_id(CustomerId(8)).await.unwrap().is_some());
        assert_eq!(*acks.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_handler_past_grace() {
        let acks: Acks = Arc::default();
        let inner = Arc::new(InMemoryLedgerStore::new());
        let ledger = SlowLedger {
            inner: inner.clone(),
            delay: Duration::from_secs(5),
            failing: None,
        };

        let (mut state, shutdown, task) = run_scripted(
            vec![tracked("stuck", created(9, true), &acks)],
            ledger,
            Duration::from_millis(100),
        );
        listening(&mut state).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = Instant::now();
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(inner.find_by_customer_id(CustomerId(9)).await.unwrap().is_none());
        assert!(acks.lock().unwrap().is_empty());
    }
}
