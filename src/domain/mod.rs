//! Domain module
//!
//! Event shapes, stored records and the statistics derived from them.

pub mod event_id;
pub mod events;
pub mod record;

pub use event_id::derive_event_id;
pub use events::{AdditionEvent, InboundMessage, ADDITION_PERFORMED};
pub use record::{
    AggregateSnapshot, Pagination, PersistOutcome, RecordPage, SummationRecord,
    SummationRecordInput, SummationStats,
};
