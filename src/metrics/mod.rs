use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers both halves of the event flow:
// - Publishing (per event type, failures, circuit breaker)
// - Subscription (state, reconnects)
// - Dispatch (received, dropped by reason, handler outcomes and latency)
//
// Each service owns one `Metrics` and serves it at GET /metrics.
// ============================================================================

/// Central metrics registry for one service process
pub struct Metrics {
    registry: Registry,

    // Publisher Metrics
    pub events_published: IntCounterVec,
    pub publish_failures: IntCounterVec,

    // Subscriber Metrics
    pub events_received: IntCounterVec,
    pub events_dropped: IntCounterVec,
    pub subscription_state: IntGauge,
    pub subscription_reconnects: IntCounter,

    // Handler Metrics
    pub handler_outcomes: IntCounterVec,
    pub handler_failures: IntCounterVec,
    pub handler_duration: HistogramVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Publisher Metrics
        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Customer events published to the broker"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("event_publish_failures_total", "Customer events the broker rejected"),
            &["event_type"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        // Subscriber Metrics
        let events_received = IntCounterVec::new(
            Opts::new("events_received_total", "Decoded customer events received"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_received.clone()))?;

        let events_dropped = IntCounterVec::new(
            Opts::new("events_dropped_total", "Messages dropped before reaching a handler"),
            &["reason"],
        )?;
        registry.register(Box::new(events_dropped.clone()))?;

        let subscription_state = IntGauge::new(
            "subscription_state",
            "Event subscription state (0=Disconnected, 1=Listening)",
        )?;
        registry.register(Box::new(subscription_state.clone()))?;

        let subscription_reconnects = IntCounter::new(
            "subscription_reconnects_total",
            "Times the event subscription was re-established",
        )?;
        registry.register(Box::new(subscription_reconnects.clone()))?;

        // Handler Metrics
        let handler_outcomes = IntCounterVec::new(
            Opts::new("handler_outcomes_total", "Reconciliation handler outcomes"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(handler_outcomes.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new("handler_failures_total", "Reconciliation handler failures"),
            &["event_type"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        let handler_duration = HistogramVec::new(
            HistogramOpts::new("handler_duration_seconds", "Reconciliation handler duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(handler_duration.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGauge::new(
            "publisher_circuit_breaker_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new(
                "publisher_circuit_breaker_transitions_total",
                "Publisher circuit breaker state transitions",
            ),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            events_published,
            publish_failures,
            events_received,
            events_dropped,
            subscription_state,
            subscription_reconnects,
            handler_outcomes,
            handler_failures,
            handler_duration,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_published(&self, event_type: &str) {
        self.events_published.with_label_values(&[event_type]).inc();
    }

    pub fn record_publish_failure(&self, event_type: &str) {
        self.publish_failures.with_label_values(&[event_type]).inc();
    }

    pub fn record_received(&self, event_type: &str) {
        self.events_received.with_label_values(&[event_type]).inc();
    }

    pub fn record_dropped(&self, reason: &str) {
        self.events_dropped.with_label_values(&[reason]).inc();
    }

    /// Helper to record a completed handler run
    pub fn record_handler(&self, event_type: &str, outcome: &str, duration_secs: f64) {
        self.handler_outcomes
            .with_label_values(&[event_type, outcome])
            .inc();
        self.handler_duration
            .with_label_values(&[event_type])
            .observe(duration_secs);
    }

    pub fn record_handler_failure(&self, event_type: &str, duration_secs: f64) {
        self.handler_failures.with_label_values(&[event_type]).inc();
        self.handler_duration
            .with_label_values(&[event_type])
            .observe(duration_secs);
    }

    pub fn set_subscription_state(&self, listening: bool) {
        self.subscription_state.set(i64::from(listening));
    }

    pub fn record_reconnect(&self) {
        self.subscription_reconnects.inc();
    }

    pub fn set_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }

    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions
            .with_label_values(&[from_state, to_state])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_published() {
        let metrics = Metrics::new().unwrap();
        metrics.record_published("user:created");
        metrics.record_published("user:created");
        metrics.record_publish_failure("user:deleted");

        let gathered = metrics.registry.gather();
        let published = gathered
            .iter()
            .find(|m| m.name() == "events_published_total")
            .unwrap();
        assert_eq!(published.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_dropped_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dropped("malformed");
        metrics.record_dropped("unknown_type");

        let gathered = metrics.registry.gather();
        let dropped = gathered
            .iter()
            .find(|m| m.name() == "events_dropped_total")
            .unwrap();
        assert_eq!(dropped.metric.len(), 2);
    }

    #[test]
    fn test_subscription_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_subscription_state(true);
        assert_eq!(metrics.subscription_state.get(), 1);
        metrics.set_subscription_state(false);
        assert_eq!(metrics.subscription_state.get(), 0);
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_handler("user:created", "enrolled", 0.01);

        let text = metrics.render().unwrap();
        assert!(text.contains("handler_outcomes_total"));
        assert!(text.contains("outcome=\"enrolled\""));
    }
}
