use actix_web::{web, App, HttpServer};
use kameo::Actor;
use std::sync::Arc;

use customer_loyalty::actors::{HealthCheckable, HealthMonitorActor};
use customer_loyalty::api;
use customer_loyalty::config::Config;
use customer_loyalty::db::{self, DatabaseProbe};
use customer_loyalty::domain::customer::{CustomerService, PgCustomerStore};
use customer_loyalty::events::EventPublisher;
use customer_loyalty::messaging;
use customer_loyalty::metrics::Metrics;
use customer_loyalty::telemetry;
use customer_loyalty::utils::CircuitBreakerConfig;

const SERVICE_NAME: &str = "customer-service";
const DEFAULT_PORT: u16 = 3001;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let config = Config::from_env(SERVICE_NAME, DEFAULT_PORT);
    let service_name = config.service_name.as_str();

    tracing::info!("🚀 Starting {}", service_name);

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);

    // === 2. Database ===
    let pool = db::connect(&config.database).await?;
    db::ensure_customer_schema(&pool).await?;

    // === 3. Broker + publisher ===
    let broker = messaging::connect(&config.broker).await?;
    tracing::info!(broker = broker.name(), channel = %config.broker.channel, "Broker ready");

    let publisher = Arc::new(EventPublisher::new(
        broker,
        config.broker.channel.clone(),
        service_name,
        CircuitBreakerConfig {
            failure_threshold: config.publisher.failure_threshold,
            cooldown: config.publisher.cooldown,
            ..Default::default()
        },
        metrics.clone(),
    ));

    // === 4. Health monitor ===
    let probes = vec![
        Arc::new(DatabaseProbe::new(pool.clone())) as Arc<dyn HealthCheckable>,
        publisher.clone() as Arc<dyn HealthCheckable>,
    ];
    let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(
        service_name,
        probes,
        config.server.health_interval,
    ));

    // === 5. HTTP ===
    let service = web::Data::new(CustomerService::new(
        Arc::new(PgCustomerStore::new(pool.clone())),
        publisher,
    ));
    let metrics_data = web::Data::new(metrics);
    let monitor_data = web::Data::new(monitor);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "🌐 HTTP server listening"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(metrics_data.clone())
            .app_data(monitor_data.clone())
            .app_data(api::json_config())
            .configure(api::customers::configure)
            .configure(api::ops::configure)
            .default_service(web::to(api::not_found))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .shutdown_timeout(config.server.shutdown_timeout.as_secs())
    .run()
    .await?;

    tracing::info!("🛑 Shutting down {}", service_name);
    pool.close().await;

    Ok(())
}
