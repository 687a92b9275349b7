// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Two bounded contexts, each owned by its own service:
// - customer: the registry, sole writer of customer records and their events
// - loyalty:  the points ledger, sole writer of loyalty accounts
//
// Each context has its own subdirectory with:
// - Model types
// - Validation of administrative input
// - Errors
// - Store trait with Postgres and in-memory implementations
// - Service orchestrating store calls (and, for customers, event publication)
//
// The loyalty context never calls the registry; it learns about customers
// only through events (see crate::events).
//
// ============================================================================

pub mod customer;
pub mod loyalty;
pub mod validation;

pub use validation::{Page, PageRequest, Paginated, Pagination, ValidationError};
