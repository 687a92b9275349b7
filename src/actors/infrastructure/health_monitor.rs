use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::reply::{Reply, ReplyError};
use kameo::Actor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthCheckable, HealthStatus};

// ============================================================================
// Health Monitor Actor - Aggregates component health
// ============================================================================
//
// Responsibilities:
// - Poll registered probes (database, broker publisher) on an interval
// - Accept pushed updates (event subscription state)
// - Aggregate a system-wide status for GET /health
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub service: String,
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    service: String,
    components: HashMap<String, ComponentHealth>,
    probes: Vec<Arc<dyn HealthCheckable>>,
    interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(
        service: impl Into<String>,
        probes: Vec<Arc<dyn HealthCheckable>>,
        interval: Duration,
    ) -> Self {
        Self {
            service: service.into(),
            components: HashMap::new(),
            probes,
            interval,
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(
            service = %state.service,
            probes = state.probes.len(),
            "🩺 HealthMonitorActor started"
        );

        if state.probes.is_empty() {
            return Ok(state);
        }

        let probes = state.probes.clone();
        let period = state.interval;
        let monitor = actor_ref.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;

                for probe in &probes {
                    let health = probe.check_health().await;

                    // Fire and forget - the monitor stopping ends the loop
                    let sent = monitor
                        .tell(UpdateHealth {
                            component: health.name,
                            status: health.status,
                            details: health.details,
                        })
                        .send()
                        .await;

                    if sent.is_err() {
                        tracing::debug!("Health monitor stopped, ending probe loop");
                        return;
                    }
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: UpdateHealth,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let previous = self
            .components
            .get(&msg.component)
            .map(|health| health.status.clone());

        if previous.as_ref() != Some(&msg.status) {
            match &msg.status {
                HealthStatus::Healthy => {
                    tracing::info!(component = %msg.component, "Component healthy")
                }
                status => tracing::warn!(
                    component = %msg.component,
                    status = status.as_str(),
                    reason = status.reason().unwrap_or_default(),
                    "Component health changed"
                ),
            }
        }

        let health = ComponentHealth {
            name: msg.component.clone(),
            status: msg.status,
            last_check: Utc::now(),
            details: msg.details,
        };

        self.components.insert(msg.component, health);
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(
        &mut self,
        _msg: GetSystemHealth,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        SystemHealth {
            service: self.service.clone(),
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
