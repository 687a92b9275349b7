use std::sync::Arc;

use super::errors::LoyaltyError;
use super::model::LoyaltyAccount;
use super::store::LedgerStore;
use crate::domain::customer::CustomerId;
use crate::domain::{Page, Paginated};

// ============================================================================
// Loyalty Service - Administrative Interface
// ============================================================================
//
// Accounts are created and removed only by the event handlers; this service
// reads them and applies administrative point additions.
//
// ============================================================================

pub struct LoyaltyService {
    ledger: Arc<dyn LedgerStore>,
}

impl LoyaltyService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    pub async fn get_points(&self, customer_id: CustomerId) -> Result<LoyaltyAccount, LoyaltyError> {
        self.ledger
            .find_by_customer_id(customer_id)
            .await?
            .ok_or(LoyaltyError::NotEnrolled(customer_id))
    }

    pub async fn list(&self, page: Page) -> Result<Paginated<LoyaltyAccount>, LoyaltyError> {
        let accounts = self.ledger.list(page.limit(), page.offset()).await?;
        let total = self.ledger.count().await?;
        Ok(Paginated::new(accounts, page, total))
    }

    /// Add `amount` points (already validated to 1..=1000) to an existing account.
    pub async fn add_points(
        &self,
        customer_id: CustomerId,
        amount: i64,
    ) -> Result<LoyaltyAccount, LoyaltyError> {
        let account = self
            .ledger
            .add_points(customer_id, amount)
            .await?
            .ok_or(LoyaltyError::NotEnrolled(customer_id))?;

        tracing::info!(
            customer_id = %customer_id,
            added = amount,
            balance = account.points,
            "Loyalty points added"
        );

        Ok(account)
    }
}
