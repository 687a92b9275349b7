use async_trait::async_trait;
use sqlx::PgPool;

use super::model::{Customer, CustomerChanges, CustomerId, NewCustomer};
use crate::db::StoreError;

// ============================================================================
// Customer Store
// ============================================================================
//
// Every mutation returns the row as committed, so callers can publish an
// event snapshot that matches the stored state exactly.
//
// ============================================================================

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Fails with `StoreError::UniqueViolation` when the email is taken.
    async fn insert(&self, customer: &NewCustomer) -> Result<Customer, StoreError>;

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;

    /// Newest first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    /// `None` when no row has this id
    async fn update(
        &self,
        id: CustomerId,
        changes: &CustomerChanges,
    ) -> Result<Option<Customer>, StoreError>;

    /// Returns the deleted row, `None` when no row has this id
    async fn delete(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
}

pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn insert(&self, customer: &NewCustomer) -> Result<Customer, StoreError> {
        let row = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, email, fidelity_opt_in)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, fidelity_opt_in, created_at, updated_at
            "#,
        )
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.fidelity_opt_in)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, fidelity_opt_in, created_at, updated_at FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, fidelity_opt_in, created_at, updated_at FROM customers WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, fidelity_opt_in, created_at, updated_at
            FROM customers
            ORDER BY created_at DESC, id DESC
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
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn update(
        &self,
        id: CustomerId,
        changes: &CustomerChanges,
    ) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                fidelity_opt_in = COALESCE($4, fidelity_opt_in),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, fidelity_opt_in, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.fidelity_opt_in)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, Customer>(
            r#"
            DELETE FROM customers
            WHERE id = $1
            RETURNING id, name, email, fidelity_opt_in, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
