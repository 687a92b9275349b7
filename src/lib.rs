// ============================================================================
// Customer Loyalty - Two services kept consistent through customer events
// ============================================================================
//
// - customer-service: customer registry, publishes lifecycle events
// - loyalty-service:  points ledger, reconciles itself from those events
//
// ============================================================================

pub mod actors;
pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod telemetry;
pub mod utils;
