//! summation-service Library
//!
//! Re-exports modules for integration testing and the server binary.

pub mod api;
pub mod codec;
pub mod consumer;
pub mod domain;
pub mod service;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::{Config, KafkaConfig};
pub use consumer::{ConsumerGroupManager, EventSource, MessageHandler};
pub use domain::{AggregateSnapshot, RecordPage, SummationRecord, SummationStats};
pub use error::{AppError, AppResult, ErrorResponse};
pub use service::{ConsumerStatus, HealthSnapshot, SummationService};
pub use store::{PgSummationStore, StoreError, SummationStore};
