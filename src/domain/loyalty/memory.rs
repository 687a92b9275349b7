use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::model::LoyaltyAccount;
use super::store::LedgerStore;
use crate::db::StoreError;
use crate::domain::customer::CustomerId;

/// In-process ledger. The map lock makes `create` and `add_points` atomic,
/// matching the conditional statements of the Postgres store.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    accounts: Mutex<HashMap<CustomerId, LoyaltyAccount>>,
    unavailable: AtomicBool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreError::Unavailable` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_by_customer_id(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        self.check_available()?;
        Ok(self.accounts.lock().await.get(&customer_id).cloned())
    }

    async fn create(
        &self,
        customer_id: CustomerId,
        initial_points: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        self.check_available()?;
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&customer_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let account = LoyaltyAccount {
            customer_id,
            points: initial_points,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(customer_id, account.clone());
        Ok(Some(account))
    }

    async fn add_points(
        &self,
        customer_id: CustomerId,
        amount: i64,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        self.check_available()?;
        let mut accounts = self.accounts.lock().await;
        Ok(accounts.get_mut(&customer_id).map(|account| {
            account.points += amount;
            account.updated_at = Utc::now();
            account.clone()
        }))
    }

    async fn delete(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<LoyaltyAccount>, StoreError> {
        self.check_available()?;
        Ok(self.accounts.lock().await.remove(&customer_id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<LoyaltyAccount>, StoreError> {
        self.check_available()?;
        let mut accounts: Vec<LoyaltyAccount> =
            self.accounts.lock().await.values().cloned().collect();
        accounts.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(accounts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        self.check_available()?;
        Ok(self.accounts.lock().await.len() as i64)
    }
}
