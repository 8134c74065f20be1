use serde::{Deserialize, Serialize};

use crate::{AccountId, EventId};

/// `position` | `ccxt` | `risk` ... — the namespace a WebSocket subscriber
/// filters on (spec.md §4.7).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventNamespace {
    Position,
    Ccxt,
    Risk,
}

impl EventNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventNamespace::Position => "position",
            EventNamespace::Ccxt => "ccxt",
            EventNamespace::Risk => "risk",
        }
    }
}

/// Append-only row written in the same transaction as the state change it
/// describes (spec.md §3 `EventOutbox`, §4.7, testable property 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutbox {
    pub id: EventId,
    pub account_id: AccountId,
    pub namespace: EventNamespace,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Convenience constructors for the event types the executor/reconciler/
/// dispatcher emit by name throughout spec.md §4.5–§4.8.
#[derive(Debug, Clone)]
pub struct EventPayload {
    pub namespace: EventNamespace,
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

impl EventPayload {
    pub fn new(namespace: EventNamespace, event_type: &'static str, payload: serde_json::Value) -> Self {
        Self {
            namespace,
            event_type,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_as_str() {
        assert_eq!(EventNamespace::Position.as_str(), "position");
        assert_eq!(EventNamespace::Ccxt.as_str(), "ccxt");
    }
}
