use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Customer Model
// ============================================================================

/// Durable customer identifier assigned by the registry store
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct CustomerId(pub i64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed customer row.
///
/// Serialized with snake_case keys: this is both the HTTP representation and
/// the `data` snapshot carried by lifecycle events (`fidelity_opt_in` is read
/// under that exact key by the loyalty service).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub fidelity_opt_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub fidelity_opt_in: bool,
}

/// Validated partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub fidelity_opt_in: Option<bool>,
}

impl CustomerChanges {
    pub fn apply_to(&self, customer: &mut Customer) {
        if let Some(name) = &self.name {
            customer.name = name.clone();
        }
        if let Some(email) = &self.email {
            customer.email = email.clone();
        }
        if let Some(opt_in) = self.fidelity_opt_in {
            customer.fidelity_opt_in = opt_in;
        }
    }
}

/// Body of `POST /api/customers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub fidelity_opt_in: Option<bool>,
}

/// Body of `PUT /api/customers/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub fidelity_opt_in: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Customer {
        let now = Utc::now();
        Customer {
            id: CustomerId(7),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            fidelity_opt_in: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_snapshot_uses_wire_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["fidelity_opt_in"], false);
        assert!(value.get("created_at").is_some());
    }

    #[test]
    fn test_changes_keep_unspecified_fields() {
        let mut customer = sample();
        let changes = CustomerChanges {
            fidelity_opt_in: Some(true),
            ..Default::default()
        };
        changes.apply_to(&mut customer);

        assert!(customer.fidelity_opt_in);
        assert_eq!(customer.name, "Ada");
        assert_eq!(customer.email, "ada@example.com");
    }

    #[test]
    fn test_create_request_rejects_unknown_fields() {
        let parsed: Result<CreateCustomerRequest, _> =
            serde_json::from_str(r#"{"name":"Ada","email":"a@b.io","admin":true}"#);
        assert!(parsed.is_err());

        let parsed: CreateCustomerRequest =
            serde_json::from_str(r#"{"name":"Ada","email":"a@b.io","fidelityOptIn":true}"#)
                .unwrap();
        assert_eq!(parsed.fidelity_opt_in, Some(true));
    }
}
