//! Database access layer.
//!
//! This module provides:
//! - Connection pool management
//! - Transaction scoping through execution contexts
//! - The `Database` façade
//! - Fluent query construction

pub mod builder;
pub mod database;
pub mod pool;
pub mod transaction;

pub use builder::QueryBuilder;
pub use database::Database;
pub use pool::{ConnectionId, ConnectionPool, PoolStats, PooledConnection};
pub use transaction::TransactionContext;
