use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::customer::CustomerId;

// ============================================================================
// Event Envelope - Wire format of customer lifecycle events
// ============================================================================
//
//   { "type": "user:created", "data": { ...customer row... },
//     "timestamp": "2024-01-01T00:00:00Z", "service": "customer-service" }
//
// `data` is the full customer row as committed. Decoding only extracts what
// the reconciliation handlers depend on: the subject id and, for created
// events, the `fidelity_opt_in` flag.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CustomerCreated,
    CustomerUpdated,
    CustomerDeleted,
}

impl EventKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventKind::CustomerCreated => "user:created",
            EventKind::CustomerUpdated => "user:updated",
            EventKind::CustomerDeleted => "user:deleted",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "user:created" => Some(EventKind::CustomerCreated),
            "user:updated" => Some(EventKind::CustomerUpdated),
            "user:deleted" => Some(EventKind::CustomerDeleted),
            _ => None,
        }
    }
}

/// Serialized form of every event on the channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub service: String,
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn new(kind: EventKind, data: T, service: impl Into<String>) -> Self {
        Self {
            event_type: kind.as_wire().to_string(),
            data,
            timestamp: Utc::now(),
            service: service.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decoded event, one variant per kind the loyalty service understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerEvent {
    Created {
        customer_id: CustomerId,
        fidelity_opt_in: bool,
    },
    Updated {
        customer_id: CustomerId,
    },
    Deleted {
        customer_id: CustomerId,
    },
}

impl CustomerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CustomerEvent::Created { .. } => EventKind::CustomerCreated,
            CustomerEvent::Updated { .. } => EventKind::CustomerUpdated,
            CustomerEvent::Deleted { .. } => EventKind::CustomerDeleted,
        }
    }

    pub fn customer_id(&self) -> CustomerId {
        match self {
            CustomerEvent::Created { customer_id, .. }
            | CustomerEvent::Updated { customer_id }
            | CustomerEvent::Deleted { customer_id } => *customer_id,
        }
    }
}

/// An event plus the envelope metadata kept for diagnostics
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub event: CustomerEvent,
    pub emitted_at: DateTime<Utc>,
    pub producer: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event data has no customer id")]
    MissingSubject,

    #[error("event data has an invalid customer id")]
    InvalidSubject,

    #[error("user:created data has no fidelity_opt_in flag")]
    MissingOptIn,

    #[error("unknown event type '{0}'")]
    UnknownType(String),
}

impl DecodeError {
    /// Label used for the dropped-messages metric
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Malformed(_) => "malformed",
            DecodeError::MissingSubject | DecodeError::InvalidSubject => "missing_subject",
            DecodeError::MissingOptIn => "missing_opt_in",
            DecodeError::UnknownType(_) => "unknown_type",
        }
    }
}

#[derive(Deserialize)]
struct SubjectFields {
    id: Option<Value>,
    fidelity_opt_in: Option<bool>,
}

/// Decode one raw message into a routed event.
pub fn decode(payload: &str) -> Result<ReceivedEvent, DecodeError> {
    let envelope: EventEnvelope<Value> = serde_json::from_str(payload)?;

    let Some(kind) = EventKind::from_wire(&envelope.event_type) else {
        return Err(DecodeError::UnknownType(envelope.event_type));
    };

    let fields = SubjectFields::deserialize(&envelope.data)?;
    let customer_id = match fields.id {
        None | Some(Value::Null) => return Err(DecodeError::MissingSubject),
        Some(id) => parse_subject(&id).ok_or(DecodeError::InvalidSubject)?,
    };

    let event = match kind {
        EventKind::CustomerCreated => CustomerEvent::Created {
            customer_id,
            fidelity_opt_in: fields.fidelity_opt_in.ok_or(DecodeError::MissingOptIn)?,
        },
        EventKind::CustomerUpdated => CustomerEvent::Updated { customer_id },
        EventKind::CustomerDeleted => CustomerEvent::Deleted { customer_id },
    };

    Ok(ReceivedEvent {
        event,
        emitted_at: envelope.timestamp,
        producer: envelope.service,
    })
}

/// Ids arrive as JSON numbers; numeric strings are accepted too.
fn parse_subject(id: &Value) -> Option<CustomerId> {
    let id = match id {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id >= 1).then_some(CustomerId(id))
}
