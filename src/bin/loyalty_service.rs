use actix_web::{web, App, HttpServer};
use kameo::Actor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use customer_loyalty::actors::{HealthCheckable, HealthMonitorActor};
use customer_loyalty::api;
use customer_loyalty::config::Config;
use customer_loyalty::db::{self, DatabaseProbe};
use customer_loyalty::domain::loyalty::{LoyaltyService, PgLedgerStore};
use customer_loyalty::events::{
    EventSubscriber, ReconciliationHandlers, SubscriberConfig, SubscriptionState,
};
use customer_loyalty::messaging;
use customer_loyalty::metrics::Metrics;
use customer_loyalty::telemetry;
use customer_loyalty::utils::RetryConfig;

const SERVICE_NAME: &str = "loyalty-service";
const DEFAULT_PORT: u16 = 3002;

/// How long startup waits for the first subscription before serving anyway
const LISTEN_WAIT: Duration = Duration::from_secs(5);

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
    db::ensure_ledger_schema(&pool).await?;
    let ledger = Arc::new(PgLedgerStore::new(pool.clone()));

    // === 3. Broker ===
    let broker = messaging::connect(&config.broker).await?;
    tracing::info!(broker = broker.name(), channel = %config.broker.channel, "Broker ready");

    // === 4. Health monitor ===
    let probes = vec![Arc::new(DatabaseProbe::new(pool.clone())) as Arc<dyn HealthCheckable>];
    let monitor = HealthMonitorActor::spawn(HealthMonitorActor::new(
        service_name,
        probes,
        config.server.health_interval,
    ));

    // === 5. Event subscriber ===
    let subscriber = EventSubscriber::new(
        broker,
        Arc::new(ReconciliationHandlers::new(ledger.clone())),
        metrics.clone(),
        SubscriberConfig {
            channel: config.broker.channel.clone(),
            reconnect: RetryConfig::reconnect(
                config.subscriber.reconnect_initial_delay,
                config.subscriber.reconnect_max_delay,
            ),
            shutdown_grace: config.server.shutdown_timeout,
        },
    )
    .with_health_monitor(monitor.clone());

    let mut state = subscriber.state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subscriber_task = tokio::spawn(subscriber.run(shutdown_rx));

    let listening = matches!(
        tokio::time::timeout(
            LISTEN_WAIT,
            state.wait_for(|s| *s == SubscriptionState::Listening),
        )
        .await,
        Ok(Ok(_))
    );
    if !listening {
        tracing::warn!("Event subscription not ready yet, retrying in the background");
    }

    // === 6. HTTP ===
    let service = web::Data::new(LoyaltyService::new(ledger));
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
            .configure(api::loyalty::configure)
            .configure(api::ops::configure)
            .default_service(web::to(api::not_found))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .shutdown_timeout(config.server.shutdown_timeout.as_secs())
    .run()
    .await?;

    // === 7. Shutdown: close subscription, drain handlers ===
    tracing::info!("🛑 Shutting down {}", service_name);
    let _ = shutdown_tx.send(true);

    let budget = config.server.shutdown_timeout + Duration::from_secs(1);
    match tokio::time::timeout(budget, subscriber_task).await {
        Ok(Ok(())) => tracing::info!("Event subscriber stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Event subscriber task failed"),
        Err(_) => tracing::warn!("Event subscriber did not stop in time"),
    }

    pool.close().await;
    Ok(())
}
