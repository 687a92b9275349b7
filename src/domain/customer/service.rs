use std::sync::Arc;

use super::errors::CustomerError;
use super::model::{Customer, CustomerChanges, CustomerId, NewCustomer};
use super::store::CustomerStore;
use crate::db::StoreError;
use crate::domain::{Page, Paginated};
use crate::events::EventPublisher;

// ============================================================================
// Customer Service
// ============================================================================
//
// Orchestrates: validated input → store (commit) → publish lifecycle event
//
// The event is published only once the store returned the committed row, so
// a delivered event never precedes the state it describes. A publish failure
// fails the call; the committed row stays in place.
//
// ============================================================================

pub struct CustomerService {
    store: Arc<dyn CustomerStore>,
    publisher: Arc<EventPublisher>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn CustomerStore>, publisher: Arc<EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn create(&self, customer: NewCustomer) -> Result<Customer, CustomerError> {
        if self.store.find_by_email(&customer.email).await?.is_some() {
            return Err(CustomerError::EmailTaken(customer.email));
        }

        let created = match self.store.insert(&customer).await {
            Ok(created) => created,
            Err(StoreError::UniqueViolation(_)) => {
                return Err(CustomerError::EmailTaken(customer.email))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            customer_id = %created.id,
            fidelity_opt_in = created.fidelity_opt_in,
            "Customer created"
        );

        self.publisher.publish_created(&created).await?;
        Ok(created)
    }

    pub async fn get(&self, id: CustomerId) -> Result<Customer, CustomerError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(CustomerError::NotFound(id))
    }

    pub async fn list(&self, page: Page) -> Result<Paginated<Customer>, CustomerError> {
        let customers = self.store.list(page.limit(), page.offset()).await?;
        let total = self.store.count().await?;
        Ok(Paginated::new(customers, page, total))
    }

    pub async fn update(
        &self,
        id: CustomerId,
        changes: CustomerChanges,
    ) -> Result<Customer, CustomerError> {
        let current = self.get(id).await?;

        if let Some(email) = &changes.email {
            if email != &current.email {
                if let Some(owner) = self.store.find_by_email(email).await? {
                    if owner.id != id {
                        return Err(CustomerError::EmailTaken(email.clone()));
                    }
                }
            }
        }

        let updated = match self.store.update(id, &changes).await {
            Ok(Some(updated)) => updated,
            Ok(None) => return Err(CustomerError::NotFound(id)),
            Err(StoreError::UniqueViolation(_)) => {
                return Err(CustomerError::EmailTaken(changes.email.unwrap_or_default()))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(customer_id = %updated.id, "Customer updated");

        self.publisher.publish_updated(&updated).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: CustomerId) -> Result<Customer, CustomerError> {
        let deleted = self
            .store
            .delete(id)
            .await?
            .ok_or(CustomerError::NotFound(id))?;

        tracing::info!(customer_id = %deleted.id, "Customer deleted");

        self.publisher.publish_deleted(&deleted).await?;
        Ok(deleted)
    }
}
