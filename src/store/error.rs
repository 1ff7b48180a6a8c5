//! Store Errors

/// Errors that can occur in the record store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row violated a table constraint other than the event id dedup
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Connection, pool or query failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Caller passed arguments the store cannot serve
    #[error("Invalid query argument: {0}")]
    InvalidArgument(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Class 23: integrity constraint violation
            sqlx::Error::Database(db)
                if db.code().map(|c| c.starts_with("23")).unwrap_or(false) =>
            {
                StoreError::Constraint(db.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    /// Whether this error means the store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Constraint("duplicate key".to_string());
        assert!(err.to_string().contains("Constraint violation"));

        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(err.to_string().contains("Database error"));
        assert!(err.is_unavailable());

        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_unavailable());
    }
}
