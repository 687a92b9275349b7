use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::actors::{ComponentHealth, HealthCheckable, HealthStatus};
use crate::config::DatabaseConfig;
use crate::utils::{retry_on_transient, IsTransient, RetryConfig};

// ============================================================================
// Database - Pool, Schema Bootstrap, Store Errors
// ============================================================================
//
// Each service owns its own database; the two schemas never reference each
// other. Tables are created on startup when missing.
//
// `loyalty_points.customer_id` is the primary key: it is what makes the
// conditional insert in the ledger store race-safe when two deliveries of the
// same event are handled concurrently.
//
// ============================================================================

const CUSTOMER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    email           VARCHAR(255) NOT NULL UNIQUE,
    fidelity_opt_in BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS loyalty_points (
    customer_id BIGINT PRIMARY KEY,
    points      BIGINT NOT NULL DEFAULT 0 CHECK (points >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                let constraint = db_error.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(error)
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::UniqueViolation(_) => false,
            StoreError::Unavailable(_) => true,
            StoreError::Database(error) => matches!(
                error,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
            ),
        }
    }
}

/// Connect the pool, retrying while the database is still coming up.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    tracing::info!("Connecting to Postgres...");

    let pool = retry_on_transient(RetryConfig::startup(), move |_attempt| async move {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(StoreError::from)
    })
    .await
    .into_result()?;

    tracing::info!(max_connections = config.max_connections, "🗄️  Postgres pool ready");
    Ok(pool)
}

pub async fn ensure_customer_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(CUSTOMER_SCHEMA).execute(pool).await?;
    tracing::info!("Schema ready: customers");
    Ok(())
}

pub async fn ensure_ledger_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(LEDGER_SCHEMA).execute(pool).await?;
    tracing::info!("Schema ready: loyalty_points");
    Ok(())
}

/// Health probe issuing `SELECT 1` against the pool
pub struct DatabaseProbe {
    pool: PgPool,
}

impl DatabaseProbe {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthCheckable for DatabaseProbe {
    fn component_name(&self) -> &str {
        "database"
    }

    async fn check_health(&self) -> ComponentHealth {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ComponentHealth::new(self.component_name(), HealthStatus::Healthy),
            Err(e) => ComponentHealth::new(
                self.component_name(),
                HealthStatus::Unhealthy(e.to_string()),
            ),
        }
    }
}
