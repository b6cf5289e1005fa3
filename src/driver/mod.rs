//! Driver abstraction.
//!
//! The pool and the transaction layer only talk to physical sessions through
//! the [`Driver`] and [`Connection`] traits. [`SqlxDriver`] is the shipped
//! implementation for SQLite, PostgreSQL and MySQL; tests plug in their own.

#[macro_use]
pub mod macros;
pub mod params;
pub mod sqlx_driver;
pub mod types;

pub use sqlx_driver::{SqlxConnection, SqlxDriver};

use crate::models::{Credentials, QueryParam, QueryResult};
use std::future::Future;
use thiserror::Error;

/// Failure reported by a driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection is closed")]
    Closed,

    #[error("Unsupported connection URL: {0}")]
    UnsupportedUrl(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create a free-form driver error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// SQLSTATE (or backend-specific code) of a database error.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Sqlx(sqlx::Error::Database(db_err)) => db_err.code().map(|c| c.to_string()),
            _ => None,
        }
    }

    /// Whether re-running the same work may succeed: serialization failures,
    /// deadlocks, and SQLite's busy/locked results.
    pub fn is_transient(&self) -> bool {
        let Some(code) = self.code() else {
            return false;
        };
        match code.as_str() {
            "40001" | "40P01" => true,
            // SQLite reports the numeric result code; the low byte is the
            // primary code (5 busy, 6 locked)
            _ if code.len() < 5 => code.parse::<i32>().is_ok_and(|c| matches!(c & 0xff, 5 | 6)),
            _ => false,
        }
    }

    /// Whether the failure concerns the session itself rather than a statement.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Sqlx(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Opens physical connections.
pub trait Driver: Send + Sync + 'static {
    type Connection: Connection;

    /// Open a new session to `url`.
    fn open(
        &self,
        url: &str,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Connection, DriverError>> + Send;
}

/// A single physical session to the backend.
///
/// Auto-commit follows JDBC semantics: when it is off, the first statement
/// implicitly opens a transaction that lasts until `commit` or `rollback`,
/// and switching it back on commits whatever is open.
pub trait Connection: Send + 'static {
    /// Prepare `sql`, bind `params` positionally and execute it, materializing
    /// any row set.
    fn execute(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = Result<QueryResult, DriverError>> + Send;

    fn auto_commit(&self) -> bool;

    fn set_auto_commit(
        &mut self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Close the session. Closing twice is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Whether the session is dead (closed locally or by the peer).
    fn is_closed(&mut self) -> impl Future<Output = Result<bool, DriverError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        assert_eq!(DriverError::Closed.to_string(), "Connection is closed");
        assert_eq!(
            DriverError::UnsupportedUrl("foo://bar".to_string()).to_string(),
            "Unsupported connection URL: foo://bar"
        );
    }

    #[test]
    fn test_connection_failure_classification() {
        assert!(DriverError::Closed.is_connection_failure());
        assert!(!DriverError::other("syntax").is_connection_failure());
        assert!(DriverError::Sqlx(sqlx::Error::WorkerCrashed).is_connection_failure());
        assert!(!DriverError::Sqlx(sqlx::Error::RowNotFound).is_connection_failure());
    }

    /// Database error carrying only a code.
    #[derive(Debug)]
    struct CodedError(&'static str);

    impl std::fmt::Display for CodedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database error {}", self.0)
        }
    }

    impl std::error::Error for CodedError {}

    impl sqlx::error::DatabaseError for CodedError {
        fn message(&self) -> &str {
            "database error"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.0.into())
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::Other
        }
    }

    fn coded(code: &'static str) -> DriverError {
        DriverError::Sqlx(sqlx::Error::Database(Box::new(CodedError(code))))
    }

    #[test]
    fn test_transient_classification() {
        assert_eq!(coded("40001").code().as_deref(), Some("40001"));
        assert!(coded("40001").is_transient());
        assert!(coded("40P01").is_transient());
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
        assert!(coded("5").is_transient());
        assert!(coded("6").is_transient());
        assert!(coded("517").is_transient());

        assert!(!coded("23505").is_transient());
        assert!(!coded("787").is_transient());
        assert!(!DriverError::other("deadlock").is_transient());
        assert_eq!(DriverError::Closed.code(), None);
    }
}
