// ============================================================================
// Events - Cross-service consistency core
// ============================================================================
//
// How a customer change reaches the loyalty ledger:
//
//   CustomerService ──commit──▶ EventPublisher ──▶ broker channel
//                                                      │ (at-least-once)
//   LoyaltyAccount ◀── ReconciliationHandlers ◀── EventSubscriber
//
// - envelope:   wire format, event kinds, decoding
// - publisher:  registry side, publish after commit
// - subscriber: loyalty side, persistent subscription + dispatch
// - handlers:   idempotent ledger mutations per event kind
//
// ============================================================================

pub mod envelope;
pub mod handlers;
pub mod publisher;
pub mod subscriber;

pub use envelope::{decode, CustomerEvent, DecodeError, EventEnvelope, EventKind, ReceivedEvent};
pub use handlers::{HandlerError, Reconciliation, ReconciliationHandlers, WELCOME_POINTS};
pub use publisher::EventPublisher;
pub use subscriber::{EventSubscriber, SubscriberConfig, SubscriptionState};
