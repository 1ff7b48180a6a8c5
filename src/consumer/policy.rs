//! Consume-loop error policy
//!
//! A failed message is logged and dropped; the loop always moves on. There is
//! no dead-letter queue and no inline retry, broker redelivery after a restart
//! is the only retry path.

use super::{Delivery, HandlerError};

/// What happened to a delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Processed,
    /// Payload was absent or zero-length
    Empty,
    /// Handler failed; the message is skipped
    Dropped,
}

/// Log a handler result and decide the message's fate.
///
/// Every disposition advances the partition offset.
pub fn handle_outcome(delivery: &Delivery, outcome: Result<(), HandlerError>) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Processed,
        Err(e) => {
            tracing::error!(
                topic = %delivery.topic,
                partition = delivery.partition,
                offset = delivery.offset,
                error = %e,
                "Error processing message, dropping it"
            );
            Disposition::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeError;
    use crate::store::StoreError;

    fn delivery() -> Delivery {
        Delivery::new("calculator-events", 0, 7, Some(b"{}".to_vec()))
    }

    #[test]
    fn test_success_is_processed() {
        assert_eq!(handle_outcome(&delivery(), Ok(())), Disposition::Processed);
    }

    #[test]
    fn test_failures_are_dropped() {
        let decode = Err(HandlerError::Decode(DecodeError::Empty));
        assert_eq!(handle_outcome(&delivery(), decode), Disposition::Dropped);

        let store = Err(HandlerError::Store(StoreError::Database(
            sqlx::Error::PoolTimedOut,
        )));
        assert_eq!(handle_outcome(&delivery(), store), Disposition::Dropped);
    }
}
