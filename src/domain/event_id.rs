//! Deterministic event ids
//!
//! Redelivered messages must map to the same id so the store can drop them.
//! The id is a SHA-256 over the event content, never over time or randomness.

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};

use super::events::{AdditionEvent, ADDITION_PERFORMED};
use super::record::to_column_scale;

/// Derive the deduplication id of an addition event.
///
/// Operands are normalized to column scale first, so `1`, `1.0` and `1.00`
/// produce the same id.
pub fn derive_event_id(event: &AdditionEvent) -> String {
    let canonical = format!(
        "{}|{:.2}|{:.2}|{:.2}|{}",
        ADDITION_PERFORMED,
        to_column_scale(event.operand1),
        to_column_scale(event.operand2),
        to_column_scale(event.result),
        event
            .occurred_at
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
