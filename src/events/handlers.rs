use std::sync::Arc;

use super::envelope::CustomerEvent;
use crate::db::StoreError;
use crate::domain::customer::CustomerId;
use crate::domain::loyalty::LedgerStore;

// ============================================================================
// Reconciliation Handlers
// ============================================================================
//
// Map customer lifecycle events onto the loyalty ledger. Every handler is an
// idempotent set/unset on account existence, so it is safe to run twice for
// the same event and to run out of order relative to other events:
//
// - created + opted in  → account exists (created with the welcome bonus)
// - created, no opt-in  → nothing
// - updated             → nothing (opt-in changes are not applied retroactively)
// - deleted             → account does not exist
//
// ============================================================================

/// Points granted when a customer enrolls
pub const WELCOME_POINTS: i64 = 1;

/// What a handler did; every variant is a successful outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Enrolled,
    AlreadyEnrolled,
    NotOptedIn,
    Unchanged,
    Removed,
    NothingToRemove,
}

impl Reconciliation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reconciliation::Enrolled => "enrolled",
            Reconciliation::AlreadyEnrolled => "already_enrolled",
            Reconciliation::NotOptedIn => "not_opted_in",
            Reconciliation::Unchanged => "unchanged",
            Reconciliation::Removed => "removed",
            Reconciliation::NothingToRemove => "nothing_to_remove",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("ledger store failed: {0}")]
    Store(#[from] StoreError),
}

pub struct ReconciliationHandlers {
    ledger: Arc<dyn LedgerStore>,
    welcome_points: i64,
}

impl ReconciliationHandlers {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            welcome_points: WELCOME_POINTS,
        }
    }

    pub async fn handle(&self, event: &CustomerEvent) -> Result<Reconciliation, HandlerError> {
        match event {
            CustomerEvent::Created {
                customer_id,
                fidelity_opt_in,
            } => self.on_created(*customer_id, *fidelity_opt_in).await,
            CustomerEvent::Updated { customer_id } => {
                tracing::debug!(customer_id = %customer_id, "Customer updated, ledger unchanged");
                Ok(Reconciliation::Unchanged)
            }
            CustomerEvent::Deleted { customer_id } => self.on_deleted(*customer_id).await,
        }
    }

    async fn on_created(
        &self,
        customer_id: CustomerId,
        fidelity_opt_in: bool,
    ) -> Result<Reconciliation, HandlerError> {
        if !fidelity_opt_in {
            tracing::debug!(customer_id = %customer_id, "Customer did not opt in");
            return Ok(Reconciliation::NotOptedIn);
        }

        if self.ledger.find_by_customer_id(customer_id).await?.is_some() {
            tracing::debug!(customer_id = %customer_id, "Account already exists, skipping");
            return Ok(Reconciliation::AlreadyEnrolled);
        }

        // Conditional insert: a concurrent delivery may win between the
        // lookup and here, in which case nothing is written.
        match self.ledger.create(customer_id, self.welcome_points).await? {
            Some(account) => {
                tracing::info!(
                    customer_id = %customer_id,
                    points = account.points,
                    "🎉 Customer enrolled in loyalty program"
                );
                Ok(Reconciliation::Enrolled)
            }
            None => {
                tracing::debug!(customer_id = %customer_id, "Lost enrollment race, account exists");
                Ok(Reconciliation::AlreadyEnrolled)
            }
        }
    }

    async fn on_deleted(&self, customer_id: CustomerId) -> Result<Reconciliation, HandlerError> {
        match self.ledger.delete(customer_id).await? {
            Some(account) => {
                tracing::info!(
                    customer_id = %customer_id,
                    points = account.points,
                    "🗑️  Loyalty account removed"
                );
                Ok(Reconciliation::Removed)
            }
            None => {
                tracing::debug!(customer_id = %customer_id, "No loyalty account to remove");
                Ok(Reconciliation::NothingToRemove)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loyalty::InMemoryLedgerStore;

    fn created(id: i64, opt_in: bool) -> CustomerEvent {
        CustomerEvent::Created {
            customer_id: CustomerId(id),
            fidelity_opt_in: opt_in,
        }
    }

    fn deleted(id: i64) -> CustomerEvent {
        CustomerEvent::Deleted {
            customer_id: CustomerId(id),
        }
    }

    fn handlers() -> (ReconciliationHandlers, Arc<InMemoryLedgerStore>) {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        (ReconciliationHandlers::new(ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn test_opt_in_creates_account_with_welcome_point() {
        let (handlers, ledger) = handlers();

        let outcome = handlers.handle(&created(1, true)).await.unwrap();

        assert_eq!(outcome, Reconciliation::Enrolled);
        let account = ledger.find_by_customer_id(CustomerId(1)).await.unwrap().unwrap();
        assert_eq!(account.points, 1);
    }

    #[tokio::test]
    async fn test_no_opt_in_creates_nothing() {
        let (handlers, ledger) = handlers();

        let outcome = handlers.handle(&created(2, false)).await.unwrap();

        assert_eq!(outcome, Reconciliation::NotOptedIn);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_created_is_idempotent() {
        let (handlers, ledger) = handlers();

        handlers.handle(&created(3, true)).await.unwrap();
        let second = handlers.handle(&created(3, true)).await.unwrap();

        assert_eq!(second, Reconciliation::AlreadyEnrolled);
        assert_eq!(ledger.len().await, 1);
        let account = ledger.find_by_customer_id(CustomerId(3)).await.unwrap().unwrap();
        assert_eq!(account.points, 1);
    }

    #[tokio::test]
    async fn test_duplicate_created_keeps_earned_points() {
        let (handlers, ledger) = handlers();

        handlers.handle(&created(4, true)).await.unwrap();
        ledger.add_points(CustomerId(4), 50).await.unwrap();
        handlers.handle(&created(4, true)).await.unwrap();

        let account = ledger.find_by_customer_id(CustomerId(4)).await.unwrap().unwrap();
        assert_eq!(account.points, 51);
    }

    #[tokio::test]
    async fn test_updated_never_touches_ledger() {
        let (handlers, ledger) = handlers();

        let outcome = handlers
            .handle(&CustomerEvent::Updated {
                customer_id: CustomerId(5),
            })
            .await
            .unwrap();

        assert_eq!(outcome, Reconciliation::Unchanged);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (handlers, ledger) = handlers();
        handlers.handle(&created(6, true)).await.unwrap();

        assert_eq!(handlers.handle(&deleted(6)).await.unwrap(), Reconciliation::Removed);
        assert_eq!(
            handlers.handle(&deleted(6)).await.unwrap(),
            Reconciliation::NothingToRemove
        );
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_without_account_is_noop() {
        let (handlers, ledger) = handlers();

        assert_eq!(
            handlers.handle(&deleted(7)).await.unwrap(),
            Reconciliation::NothingToRemove
        );
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_deliveries_create_one_account() {
        let (handlers, ledger) = handlers();
        let handlers = Arc::new(handlers);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handlers = handlers.clone();
            tasks.push(tokio::spawn(async move {
                handlers.handle(&created(8, true)).await.unwrap()
            }));
        }

        let mut enrolled = 0;
        for task in tasks {
            if task.await.unwrap() == Reconciliation::Enrolled {
                enrolled += 1;
            }
        }

        assert_eq!(enrolled, 1);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_handler_error() {
        let (handlers, ledger) = handlers();
        ledger.set_unavailable(true);

        let result = handlers.handle(&created(9, true)).await;
        assert!(matches!(result, Err(HandlerError::Store(StoreError::Unavailable(_)))));
    }
}
