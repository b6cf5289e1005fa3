//! Shared test fixtures: a scripted in-memory driver and SQLite helpers.

#![allow(dead_code)]

use db_access::config::PoolConfig;
use db_access::models::{Credentials, DatabaseType, QueryParam, QueryResult, Row};
use db_access::{Connection, Database, DatabaseConfig, Driver, DriverError};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Counters and failure switches shared by a [`MockDriver`] and every
/// connection it opened.
#[derive(Debug, Default)]
pub struct MockState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    /// Refuse to open once this many connections were opened.
    pub open_limit: Mutex<Option<usize>>,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub fail_validation: AtomicBool,
    pub fail_disable_auto_commit: AtomicBool,
    killed: Mutex<HashSet<usize>>,
    statements: Mutex<Vec<(usize, String)>>,
}

impl MockState {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn set(&self, switch: &AtomicBool, on: bool) {
        switch.store(on, Ordering::SeqCst);
    }

    pub fn limit_opens(&self, limit: usize) {
        *self.open_limit.lock().unwrap() = Some(limit);
    }

    /// Simulate the server dropping every connection opened so far.
    pub fn kill_all(&self) {
        let mut killed = self.killed.lock().unwrap();
        killed.extend(0..self.opened());
    }

    /// `(connection serial, sql)` of every statement executed, in order.
    pub fn statements(&self) -> Vec<(usize, String)> {
        self.statements.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn open(&self, _url: &str, _credentials: &Credentials) -> Result<MockConnection, DriverError> {
        let limit = *self.state.open_limit.lock().unwrap();
        if limit.is_some_and(|limit| self.state.opened() >= limit) {
            return Err(DriverError::other("connection refused"));
        }
        let serial = self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            serial,
            state: Arc::clone(&self.state),
            auto_commit: true,
            in_transaction: false,
            closed: false,
        })
    }
}

/// Emulates manual-commit mode the same way the sqlx driver does: a
/// statement with auto-commit off opens a transaction. Every commit call is
/// counted; rollbacks only count when there was work to undo, since the pool
/// rolls back on every release.
#[derive(Debug)]
pub struct MockConnection {
    serial: usize,
    state: Arc<MockState>,
    auto_commit: bool,
    in_transaction: bool,
    closed: bool,
}

impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str, _params: &[QueryParam]) -> Result<QueryResult, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        if sql.contains("INVALID") {
            return Err(DriverError::other("syntax error"));
        }
        if !self.auto_commit {
            self.in_transaction = true;
        }
        self.state
            .statements
            .lock()
            .unwrap()
            .push((self.serial, sql.to_string()));

        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            let mut row = Row::new();
            row.insert("conn".to_string(), json!(self.serial));
            Ok(QueryResult::from_rows(vec!["conn".to_string()], vec![row]))
        } else {
            Ok(QueryResult::from_update_count(1))
        }
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DriverError> {
        if !enabled && self.state.fail_disable_auto_commit.load(Ordering::SeqCst) {
            return Err(DriverError::other("cannot disable auto-commit"));
        }
        if enabled && self.in_transaction {
            self.commit().await?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::other("commit failed"));
        }
        self.in_transaction = false;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.in_transaction = false;
            if self.state.fail_rollback.load(Ordering::SeqCst) {
                return Err(DriverError::other("rollback failed"));
            }
            self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn is_closed(&mut self) -> Result<bool, DriverError> {
        if self.state.fail_validation.load(Ordering::SeqCst) {
            return Err(DriverError::other("validation failed"));
        }
        let killed = self.state.killed.lock().unwrap().contains(&self.serial);
        Ok(self.closed || killed)
    }
}

pub fn mock_config(initial_size: usize) -> PoolConfig {
    PoolConfig::new(DatabaseType::SQLite, "mock://test").initial_size(initial_size)
}

pub async fn mock_database(initial_size: usize) -> (Database<MockDriver>, Arc<MockState>) {
    let driver = MockDriver::new();
    let state = Arc::clone(&driver.state);
    let db = Database::with_driver(driver, mock_config(initial_size))
        .await
        .expect("Failed to build mock database");
    (db, state)
}

/// Serial of the mock connection that produced a `SELECT` result.
pub fn serial_of(result: &QueryResult) -> u64 {
    result
        .first()
        .and_then(|row| row["conn"].as_u64())
        .expect("mock SELECT row")
}

/// A SQLite database in a temp file with a `users` table.
pub async fn sqlite_database(pool_size: usize) -> (Database, NamedTempFile) {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let db = open_sqlite(&file, pool_size).await;
    db.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, email TEXT, age INTEGER)",
        &[],
    )
    .await
    .expect("Failed to create table");
    (db, file)
}

/// Open a pool on an existing SQLite file; a second pool on the same file
/// only sees committed data.
pub async fn open_sqlite(file: &NamedTempFile, pool_size: usize) -> Database {
    let config = DatabaseConfig::builder()
        .db_type(DatabaseType::SQLite)
        .database(file.path().to_string_lossy())
        .pool_size(pool_size);
    Database::connect(&config)
        .await
        .expect("Failed to connect to SQLite")
}

pub async fn count_users(db: &Database) -> i64 {
    let result = db
        .execute("SELECT COUNT(*) AS count FROM users", &[])
        .await
        .expect("count query");
    result
        .first()
        .and_then(|row| row["count"].as_i64())
        .expect("count row")
}
