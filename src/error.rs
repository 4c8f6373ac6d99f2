use std::time::Duration;

use thiserror::Error;

/// Errors raised by a database driver while opening, probing, or using a session.
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// The session handle holds no live connection (closed, or lost mid-call).
    #[error("connection is not open")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SqlPoolError {
    /// The factory could not establish a session (network/auth).
    #[error("Connect failed: {0}")]
    ConnectFailed(#[source] DriverError),

    /// Eager startup could not open every connection; nothing was kept open.
    #[error("Pool initialization failed after {created} of {requested} connections: {source}")]
    PoolInitFailed {
        requested: usize,
        created: usize,
        #[source]
        source: DriverError,
    },

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Timed out after {0:?} waiting for a connection")]
    AcquireTimeout(Duration),

    #[error("Acquire cancelled")]
    AcquireCancelled,

    /// Statement execution error, surfaced verbatim.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] DriverError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Internal pool error: {0}")]
    Internal(String),
}

impl SqlPoolError {
    /// True for failures of the statement itself rather than of the pool.
    #[must_use]
    pub fn is_query_failure(&self) -> bool {
        matches!(self, SqlPoolError::QueryFailed(_))
    }
}
