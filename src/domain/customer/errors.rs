use super::model::CustomerId;
use crate::db::StoreError;
use crate::domain::ValidationError;
use crate::messaging::MessagingError;

// ============================================================================
// Customer Registry Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Customer not found: {0}")]
    NotFound(CustomerId),

    #[error("Email already exists: {0}")]
    EmailTaken(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The mutation committed but its event could not be published
    #[error("Failed to publish customer event: {0}")]
    Publish(#[from] MessagingError),
}
