// ============================================================================
// Loyalty Ledger Domain
// ============================================================================
//
// Points balances keyed by customer id. The loyalty service exclusively owns
// these rows and never writes back to the registry.
//
// ============================================================================

pub mod errors;
pub mod memory;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use errors::LoyaltyError;
pub use memory::InMemoryLedgerStore;
pub use model::*;
pub use service::LoyaltyService;
pub use store::{LedgerStore, PgLedgerStore};
pub use validation::validate_add_points;
