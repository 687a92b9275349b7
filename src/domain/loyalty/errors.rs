use crate::db::StoreError;
use crate::domain::customer::CustomerId;
use crate::domain::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No loyalty account exists for this customer
    #[error("Customer {0} is not enrolled in the loyalty program")]
    NotEnrolled(CustomerId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
