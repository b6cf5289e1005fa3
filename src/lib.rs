//! Pooled database access library
//!
//! Provides a connection pool, transaction scoping through explicit execution
//! contexts, and a fluent query builder over SQL databases (SQLite,
//! PostgreSQL, MySQL).

pub mod config;
pub mod db;
#[macro_use]
pub mod driver;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseConfig, PoolConfig};
pub use db::{ConnectionPool, Database, QueryBuilder, TransactionContext};
pub use driver::{Connection, Driver, DriverError, SqlxDriver};
pub use error::{DbError, DbResult};
pub use models::{DatabaseType, QueryParam, QueryResult, Row};
