use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

/// Points balance of one enrolled customer.
///
/// Existence of the account is what enrollment means; there is no separate
/// flag. `points` is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoyaltyAccount {
    pub customer_id: CustomerId,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minimum and maximum points accepted by a single administrative addition
pub const MIN_POINTS_PER_ADDITION: i64 = 1;
pub const MAX_POINTS_PER_ADDITION: i64 = 1000;
