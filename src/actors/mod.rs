// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for cross-cutting concerns.
//
// Structure:
// - core/           - Abstract traits and types (HealthCheckable, HealthStatus)
// - infrastructure/ - Concrete infrastructure actors (HealthMonitorActor)
//
// Note: Domain logic (customers, loyalty) uses services and stores, NOT
//       actors. Actors are reserved for infrastructure concerns only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::{ComponentHealth, HealthCheckable, HealthStatus};
pub use self::infrastructure::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
