//! Codec Errors
//!
//! Reasons a broker payload cannot be turned into an event.

use rust_decimal::Decimal;

/// Errors that can occur while decoding a broker payload
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload was absent or only whitespace
    #[error("Empty payload")]
    Empty,

    /// Payload is not valid JSON
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Payload is JSON but not an object
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// Required field is absent or null
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field is present with the wrong semantic type
    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Decimal does not fit the store's NUMERIC(10,2) columns
    #[error("Value for field {field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: Decimal },
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field, when the error concerns one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            DecodeError::MissingField(field)
            | DecodeError::InvalidField { field, .. }
            | DecodeError::OutOfRange { field, .. } => Some(*field),
            _ => None,
        }
    }
}
