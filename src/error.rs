//! Error types for the database access layer.
//!
//! `DbError` is the taxonomy callers see: connection failures (pool creation,
//! validation, closed pool), query failures (always carrying the SQL), and
//! transaction failures (wrapping the original cause plus an optional rollback
//! failure). Driver-level failures are kept as `DriverError` sources.

use crate::driver::DriverError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("{message}: {sql}")]
    Query {
        message: String,
        sql: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("Transaction failed: {source}")]
    Transaction {
        #[source]
        source: Box<DbError>,
        /// Set when the rollback attempted after the failure failed as well.
        rollback_error: Option<DriverError>,
    },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl DbError {
    /// Create a connection error with an optional driver cause.
    pub fn connection(message: impl Into<String>, source: Option<DriverError>) -> Self {
        Self::Connection {
            message: message.into(),
            source,
        }
    }

    /// The error returned by every acquire on a closed pool.
    pub fn pool_closed() -> Self {
        Self::PoolClosed
    }

    /// Create a query error for a failed statement.
    pub fn query(sql: impl Into<String>, source: DriverError) -> Self {
        Self::Query {
            message: "Query execution failed".to_string(),
            sql: sql.into(),
            source: Some(source),
        }
    }

    /// Create a query error that has no driver cause.
    pub fn invalid_query(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: sql.into(),
            source: None,
        }
    }

    /// Wrap the failure that ended a transaction.
    pub fn transaction(source: DbError, rollback_error: Option<DriverError>) -> Self {
        Self::Transaction {
            source: Box::new(source),
            rollback_error,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The SQL text attached to a query error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The rollback failure attached to a transaction error, if any.
    pub fn rollback_error(&self) -> Option<&DriverError> {
        match self {
            Self::Transaction { rollback_error, .. } => rollback_error.as_ref(),
            _ => None,
        }
    }

    /// The failure that caused a transaction to roll back.
    pub fn transaction_cause(&self) -> Option<&DbError> {
        match self {
            Self::Transaction { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolClosed)
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction { .. })
    }

    /// Check if this error is retryable.
    ///
    /// Nothing in this crate retries on its own; callers decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::PoolClosed => false,
            Self::Query { source, .. } => source.as_ref().is_some_and(DriverError::is_transient),
            Self::Transaction { source, .. } => source.is_retryable(),
            Self::Driver(err) => err.is_connection_failure() || err.is_transient(),
            Self::Configuration { .. } => false,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
