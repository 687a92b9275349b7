use actix_web::{web, HttpResponse, Responder};
use kameo::actor::ActorRef;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::actors::{GetSystemHealth, HealthMonitorActor, HealthStatus, SystemHealth};
use crate::metrics::Metrics;

// ============================================================================
// Operational Endpoints - /health and /metrics
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    match metrics.render() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health_handler(monitor: web::Data<ActorRef<HealthMonitorActor>>) -> HttpResponse {
    match monitor.ask(GetSystemHealth).send().await {
        Ok(health) => health_response(&health),
        Err(_) => {
            tracing::error!("Health monitor unavailable");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "error": "health monitor unavailable",
            }))
        }
    }
}

/// 200 while healthy or degraded, 503 once any component is unhealthy.
pub fn health_response(health: &SystemHealth) -> HttpResponse {
    let mut components = Map::new();
    for (name, component) in &health.components {
        let mut entry = Map::new();
        entry.insert("status".into(), Value::from(component.status.as_str()));
        if let Some(reason) = component.status.reason() {
            entry.insert("reason".into(), Value::from(reason));
        }
        if let Some(details) = &component.details {
            entry.insert("details".into(), Value::from(details.as_str()));
        }
        entry.insert(
            "lastCheck".into(),
            Value::from(component.last_check.to_rfc3339()),
        );
        components.insert(name.clone(), Value::Object(entry));
    }

    let body = json!({
        "status": health.overall_status.as_str(),
        "service": health.service,
        "timestamp": health.check_time.to_rfc3339(),
        "components": components,
    });

    match health.overall_status {
        HealthStatus::Unhealthy(_) => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::Ok().json(body),
    }
}
