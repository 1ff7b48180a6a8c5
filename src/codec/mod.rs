//! Event Codec module
//!
//! Turns raw broker payloads into typed events. Pure functions only;
//! wire-format concerns stop here.

mod decode;
mod error;

pub use decode::{decode, Decoded};
pub use error::DecodeError;
