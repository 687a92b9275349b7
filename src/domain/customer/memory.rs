use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::model::{Customer, CustomerChanges, CustomerId, NewCustomer};
use super::store::CustomerStore;
use crate::db::StoreError;

/// In-process customer store with the same uniqueness rules as the table
#[derive(Default)]
pub struct InMemoryCustomerStore {
    inner: Mutex<Rows>,
}

#[derive(Default)]
struct Rows {
    next_id: i64,
    customers: BTreeMap<CustomerId, Customer>,
}

impl Rows {
    fn email_owner(&self, email: &str) -> Option<CustomerId> {
        self.customers
            .values()
            .find(|customer| customer.email == email)
            .map(|customer| customer.id)
    }
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_conflict() -> StoreError {
    StoreError::UniqueViolation("customers_email_key".to_string())
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn insert(&self, customer: &NewCustomer) -> Result<Customer, StoreError> {
        let mut rows = self.inner.lock().await;
        if rows.email_owner(&customer.email).is_some() {
            return Err(email_conflict());
        }

        rows.next_id += 1;
        let now = Utc::now();
        let row = Customer {
            id: CustomerId(rows.next_id),
            name: customer.name.clone(),
            email: customer.email.clone(),
            fidelity_opt_in: customer.fidelity_opt_in,
            created_at: now,
            updated_at: now,
        };
        rows.customers.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.inner.lock().await.customers.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let rows = self.inner.lock().await;
        Ok(rows
            .email_owner(email)
            .and_then(|id| rows.customers.get(&id).cloned()))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Customer>, StoreError> {
        let rows = self.inner.lock().await;
        // Ids grow with insertion order, so reverse id order is newest first.
        Ok(rows
            .customers
            .values()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().await.customers.len() as i64)
    }

    async fn update(
        &self,
        id: CustomerId,
        changes: &CustomerChanges,
    ) -> Result<Option<Customer>, StoreError> {
        let mut rows = self.inner.lock().await;

        if let Some(email) = &changes.email {
            if rows.email_owner(email).is_some_and(|owner| owner != id) {
                return Err(email_conflict());
            }
        }

        let Some(customer) = rows.customers.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(customer);
        customer.updated_at = Utc::now();
        Ok(Some(customer.clone()))
    }

    async fn delete(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.inner.lock().await.customers.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_customer(email: &str) -> NewCustomer {
        NewCustomer {
            name: "Grace".to_string(),
            email: email.to_string(),
            fidelity_opt_in: true,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryCustomerStore::new();
        let first = store.insert(&new_customer("a@example.com")).await.unwrap();
        let second = store.insert(&new_customer("b@example.com")).await.unwrap();

        assert_eq!(first.id, CustomerId(1));
        assert_eq!(second.id, CustomerId(2));

        let listed = store.list(10, 0).await.unwrap();
        assert_eq!(listed[0].id, CustomerId(2));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let store = InMemoryCustomerStore::new();
        store.insert(&new_customer("a@example.com")).await.unwrap();

        let result = store.insert(&new_customer("a@example.com")).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_update_to_own_email_is_allowed() {
        let store = InMemoryCustomerStore::new();
        let customer = store.insert(&new_customer("a@example.com")).await.unwrap();

        let changes = CustomerChanges {
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        let updated = store.update(customer.id, &changes).await.unwrap();
        assert!(updated.is_some());
    }
}
