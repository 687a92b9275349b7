use async_trait::async_trait;
use std::sync::Arc;

use super::envelope::{EventEnvelope, EventKind};
use crate::actors::{ComponentHealth, HealthCheckable, HealthStatus};
use crate::domain::customer::Customer;
use crate::messaging::{BrokerChannel, MessagingError};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Event Publisher - Customer registry side
// ============================================================================
//
// Wraps a committed customer row in an envelope and writes it to the event
// channel, keyed by customer id. Returns only once the broker acknowledged
// the write; failures go back to the caller with no retry or buffering.
//
// A circuit breaker stops hammering a broker that keeps failing: while open,
// publishes fail fast with `MessagingError::CircuitOpen`.
//
// ============================================================================

pub struct EventPublisher {
    broker: Arc<dyn BrokerChannel>,
    channel: String,
    service: String,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(
        broker: Arc<dyn BrokerChannel>,
        channel: impl Into<String>,
        service: impl Into<String>,
        breaker: CircuitBreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.set_circuit_breaker_state(CircuitState::Closed.as_gauge());

        Self {
            broker,
            channel: channel.into(),
            service: service.into(),
            circuit_breaker: CircuitBreaker::new(breaker),
            metrics,
        }
    }

    /// Publish `kind` with `customer` (the row as committed) as its data.
    pub async fn publish(&self, kind: EventKind, customer: &Customer) -> Result<(), MessagingError> {
        let event_type = kind.as_wire();
        let payload = EventEnvelope::new(kind, customer, self.service.as_str())
            .to_json()
            .map_err(|e| MessagingError::Encode(e.to_string()))?;
        let key = customer.id.to_string();

        let before = self.circuit_breaker.state().await;
        let result = self
            .circuit_breaker
            .call(self.broker.publish(&self.channel, &key, &payload))
            .await;
        self.track_circuit(before).await;

        match result {
            Ok(()) => {
                self.metrics.record_published(event_type);
                tracing::info!(
                    event_type = event_type,
                    customer_id = %customer.id,
                    channel = %self.channel,
                    "📤 Published customer event"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                self.metrics.record_publish_failure(event_type);
                tracing::error!(
                    event_type = event_type,
                    customer_id = %customer.id,
                    "Broker circuit open, event not published"
                );
                Err(MessagingError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.metrics.record_publish_failure(event_type);
                tracing::error!(
                    event_type = event_type,
                    customer_id = %customer.id,
                    error = %e,
                    "❌ Failed to publish customer event"
                );
                Err(e)
            }
        }
    }

    pub async fn publish_created(&self, customer: &Customer) -> Result<(), MessagingError> {
        self.publish(EventKind::CustomerCreated, customer).await
    }

    pub async fn publish_updated(&self, customer: &Customer) -> Result<(), MessagingError> {
        self.publish(EventKind::CustomerUpdated, customer).await
    }

    pub async fn publish_deleted(&self, customer: &Customer) -> Result<(), MessagingError> {
        self.publish(EventKind::CustomerDeleted, customer).await
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    async fn track_circuit(&self, before: CircuitState) {
        let after = self.circuit_breaker.state().await;
        if after != before {
            self.metrics
                .record_circuit_breaker_transition(before.as_str(), after.as_str());
        }
        self.metrics.set_circuit_breaker_state(after.as_gauge());
    }
}

#[async_trait]
impl HealthCheckable for EventPublisher {
    fn component_name(&self) -> &str {
        "broker"
    }

    async fn check_health(&self) -> ComponentHealth {
        let status = match self.circuit_state().await {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        };

        ComponentHealth::new(self.component_name(), status).with_details(self.broker.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::CustomerId;
    use crate::messaging::InMemoryBroker;
    use chrono::Utc;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn customer(id: i64) -> Customer {
        let now = Utc::now();
        Customer {
            id: CustomerId(id),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            fidelity_opt_in: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn publisher(broker: Arc<InMemoryBroker>, failure_threshold: u32) -> EventPublisher {
        EventPublisher::new(
            broker,
            "customer-events",
            "customer-service",
            CircuitBreakerConfig {
                failure_threshold,
                cooldown: Duration::from_secs(60),
                success_threshold: 1,
            },
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_publish_writes_full_row() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut stream = broker.subscribe("customer-events").await.unwrap();
        let publisher = publisher(broker.clone(), 5);

        publisher.publish_deleted(&customer(4)).await.unwrap();

        let payload = stream.next().await.unwrap().unwrap().into_payload();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "user:deleted");
        assert_eq!(value["data"]["id"], 4);
        assert_eq!(value["data"]["email"], "ada@example.com");
        assert_eq!(value["data"]["fidelity_opt_in"], true);
        assert_eq!(value["service"], "customer-service");
    }

    #[tokio::test]
    async fn test_publish_failure_propagates() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_unavailable(true);
        let publisher = publisher(broker.clone(), 5);

        let result = publisher.publish_created(&customer(1)).await;
        assert!(matches!(result, Err(MessagingError::Publish { .. })));
        assert_eq!(publisher.metrics.publish_failures.with_label_values(&["user:created"]).get(), 1);
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_unavailable(true);
        let publisher = publisher(broker.clone(), 2);

        let _ = publisher.publish_created(&customer(1)).await;
        let _ = publisher.publish_created(&customer(1)).await;
        assert_eq!(publisher.circuit_state().await, CircuitState::Open);

        broker.set_unavailable(false);
        let result = publisher.publish_created(&customer(1)).await;
        assert!(matches!(result, Err(MessagingError::CircuitOpen)));
        assert_eq!(broker.published_count(), 0);

        let health = publisher.check_health().await;
        assert!(health.status.is_unhealthy());
        assert_eq!(publisher.metrics.circuit_breaker_state.get(), 1);
    }
}
