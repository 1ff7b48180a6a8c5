//! Query Errors

use crate::store::StoreError;

/// Errors returned by the read path
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(msg) => QueryError::InvalidArgument(msg),
            other => QueryError::Store(other),
        }
    }
}
