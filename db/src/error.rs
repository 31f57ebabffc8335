use std::time::Duration;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures surfaced by the pooled client.
///
/// Nothing in here is retried internally; every variant reaches the caller
/// with the underlying driver error preserved as its source.
#[derive(Debug, Error)]
pub enum DbError {
    /// The pool could not establish its minimum connections at
    /// construction. No partial pool is left behind.
    #[error("failed to initialize connection pool: {source}")]
    PoolInit { source: BoxError },

    /// A connection could not be opened for a checkout after construction.
    #[error("failed to open database connection: {source}")]
    Connect { source: BoxError },

    /// A statement failed. Its transaction has already been rolled back and
    /// the connection has been returned to the pool.
    #[error("query execution failed: {source}")]
    Query {
        #[source]
        source: sqlx::Error,
    },

    /// An operation was attempted after [`close`](crate::pool::Pool::close).
    #[error("connection pool is closed")]
    PoolClosed,

    /// Every connection stayed checked out past the configured limit.
    #[error("timed out after {0:?} waiting for a free connection")]
    AcquireTimeout(Duration),

    #[error("invalid pool configuration: {reason}")]
    Config { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_cause() {
        let err = DbError::PoolInit {
            source: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to initialize connection pool: connection refused"
        );

        let err = DbError::AcquireTimeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn pool_closed_is_terminal_wording() {
        assert_eq!(DbError::PoolClosed.to_string(), "connection pool is closed");
    }
}
