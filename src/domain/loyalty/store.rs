use async_trait::async_trait;
use sqlx::PgPool;

use super::model::LoyaltyAccount;
use crate::db::StoreError;
use crate::domain::customer::CustomerId;

// ============================================================================
// Ledger Store
// ============================================================================
//
// Keyed by owning customer. `create` and `add_points` are single conditional
// statements so concurrent deliveries of one event can never produce two
// accounts, and concurrent additions never lose an increment.
//
// ============================================================================

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_customer_id(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>, StoreError>;

    /// Create the account if none exists. `None` means another writer got
    /// there first and the existing row was left untouched.
    async fn create(
        &self,
        customer_id: CustomerId,
        initial_points: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError>;

    /// Atomically increment the balance. `None` when no account exists.
    async fn add_points(
        &self,
        customer_id: CustomerId,
        amount: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError>;

    /// Remove the account, returning it. `None` when there was nothing to remove.
    async fn delete(&self, customer_id: CustomerId)
        -> Result<Option<LoyaltyAccount>, StoreError>;

    /// Points descending, then newest first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<LoyaltyAccount>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_by_customer_id(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        let row = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT customer_id, points, created_at, updated_at FROM loyalty_points WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn create(
        &self,
        customer_id: CustomerId,
        initial_points: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        let row = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            INSERT INTO loyalty_points (customer_id, points)
            VALUES ($1, $2)
            ON CONFLICT (customer_id) DO NOTHING
            RETURNING customer_id, points, created_at, updated_at
            "#,
        )
        .bind(customer_id)
        .bind(initial_points)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn add_points(
        &self,
        customer_id: CustomerId,
        amount: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        let row = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            UPDATE loyalty_points
            SET points = points + $2, updated_at = NOW()
            WHERE customer_id = $1
            RETURNING customer_id, points, created_at, updated_at
            "#,
        )
        .bind(customer_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        let row = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            DELETE FROM loyalty_points
            WHERE customer_id = $1
            RETURNING customer_id, points, created_at, updated_at
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<LoyaltyAccount>, StoreError> {
        let rows = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT customer_id, points, created_at, updated_at
            FROM loyalty_points
            ORDER BY points DESC, created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM loyalty_points")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}
