//! Data models shared by the pool, the drivers and the façade.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod result;

// Re-export commonly used types
pub use connection::{Credentials, DatabaseType};
pub use query::QueryParam;
pub use result::{QueryResult, Row};
