// ============================================================================
// Customer Registry Domain
// ============================================================================
//
// Canonical customer records. The registry is the only writer of customer
// rows and the only producer of customer lifecycle events.
//
// ============================================================================

pub mod errors;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use errors::CustomerError;
pub use memory::InMemoryCustomerStore;
pub use model::*;
pub use service::CustomerService;
pub use store::{CustomerStore, PgCustomerStore};
pub use validation::{parse_customer_id, validate_create, validate_update};
