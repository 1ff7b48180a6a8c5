//! Payload decoding
//!
//! Strict validation of the JSON envelope. Field lookups are explicit so each
//! failure names the field at fault instead of surfacing a generic serde error.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::domain::record::{max_column_value, to_column_scale};
use crate::domain::{AdditionEvent, InboundMessage, ADDITION_PERFORMED};

use super::DecodeError;

/// Outcome of decoding a well-formed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// An `addition_performed` event ready for persistence
    Addition(InboundMessage),
    /// A well-formed envelope carrying some other event type
    Ignored { event_type: String },
}

/// Decode a raw broker payload.
///
/// Envelopes whose `eventType` is not `addition_performed` are returned as
/// [`Decoded::Ignored`] without validating their payload.
pub fn decode(raw: &[u8]) -> Result<Decoded, DecodeError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_slice(raw)?;
    let envelope = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let event_type = match required(envelope, "eventType", &[])? {
        Value::String(s) => s.clone(),
        other => {
            return Err(DecodeError::invalid(
                "eventType",
                format!("expected string, got {}", kind(other)),
            ))
        }
    };

    if event_type != ADDITION_PERFORMED {
        return Ok(Decoded::Ignored { event_type });
    }

    let payload = required(envelope, "payload", &[])?
        .as_object()
        .ok_or_else(|| DecodeError::invalid("payload", "expected object"))?;

    let event = AdditionEvent {
        operand1: column_decimal(payload, "number1", &["operand1"])?,
        operand2: column_decimal(payload, "number2", &["operand2"])?,
        result: column_decimal(payload, "result", &[])?,
        occurred_at: timestamp(required(payload, "timestamp", &["occurredAt"])?, "timestamp")?,
    };

    let emitted_at = match envelope.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(v) => Some(timestamp(v, "emittedAt")?),
    };

    Ok(Decoded::Addition(InboundMessage {
        event_type,
        payload: event,
        emitted_at,
    }))
}

/// Look up a non-null field by name or any of its aliases
fn required<'a>(
    object: &'a Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<&'a Value, DecodeError> {
    std::iter::once(field)
        .chain(aliases.iter().copied())
        .filter_map(|name| object.get(name))
        .find(|v| !v.is_null())
        .ok_or(DecodeError::MissingField(field))
}

fn column_decimal(
    object: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Decimal, DecodeError> {
    let value = decimal(required(object, field, aliases)?, field)?;

    if to_column_scale(value).abs() > max_column_value() {
        return Err(DecodeError::OutOfRange { field, value });
    }

    Ok(value)
}

fn decimal(value: &Value, field: &'static str) -> Result<Decimal, DecodeError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(DecodeError::invalid(
                field,
                format!("expected number, got {}", kind(other)),
            ))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| DecodeError::invalid(field, format!("{text:?} is not a decimal: {e}")))
}

/// Accepts RFC 3339 strings or epoch milliseconds
fn timestamp(value: &Value, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DecodeError::invalid(field, format!("{s:?} is not RFC 3339: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| DecodeError::invalid(field, format!("{n} is not epoch milliseconds"))),
        other => Err(DecodeError::invalid(
            field,
            format!("expected timestamp, got {}", kind(other)),
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
