//! Inbound Events
//!
//! Typed shapes of the calculator events carried on the broker.
//! Events are immutable facts produced upstream; this service only reads them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event type tag of the only event this service persists
pub const ADDITION_PERFORMED: &str = "addition_performed";

/// An addition computed by the upstream calculator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionEvent {
    #[serde(rename = "number1", alias = "operand1")]
    pub operand1: Decimal,

    #[serde(rename = "number2", alias = "operand2")]
    pub operand2: Decimal,

    pub result: Decimal,

    #[serde(rename = "timestamp", alias = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
}

/// Envelope of a recognized addition event as received from the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub event_type: String,

    pub payload: AdditionEvent,

    /// Emission time stamped by the producer, if it sent one
    #[serde(rename = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub emitted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_addition_event_wire_names() {
        let event = AdditionEvent {
            operand1: dec!(1.5),
            operand2: dec!(2),
            result: dec!(3.5),
            occurred_at: "2025-01-01T00:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("number1").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("operand1").is_none());
    }

    #[test]
    fn test_addition_event_accepts_aliases() {
        let json = r#"{
            "operand1": 4,
            "operand2": "5",
            "result": 9,
            "occurredAt": "2025-01-01T10:00:00.000Z"
        }"#;

        let event: AdditionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.operand1, dec!(4));
        assert_eq!(event.operand2, dec!(5));
        assert_eq!(event.result, dec!(9));
    }
}
