//! Database façade.

use crate::config::{DatabaseConfig, PoolConfig};
use crate::db::builder::QueryBuilder;
use crate::db::pool::ConnectionPool;
use crate::db::transaction::TransactionContext;
use crate::driver::{Driver, SqlxDriver};
use crate::error::DbResult;
use crate::models::{QueryParam, QueryResult};
use tracing::info;

/// Entry point: owns the pool and hands out execution contexts.
///
/// Every method that does not take a [`TransactionContext`] runs on a fresh
/// one, so calls made directly on `Database` never see another caller's
/// transaction.
#[derive(Debug)]
pub struct Database<D: Driver = SqlxDriver> {
    pool: ConnectionPool<D>,
}

impl Database<SqlxDriver> {
    /// Connect through sqlx using `config`.
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let pool_config = config.pool_config()?;
        info!(db_type = %pool_config.driver, "Connecting to database");
        Self::with_driver(SqlxDriver, pool_config).await
    }
}

impl<D: Driver> Database<D> {
    /// Build a database over any driver.
    pub async fn with_driver(driver: D, config: PoolConfig) -> DbResult<Self> {
        let pool = ConnectionPool::new(driver, config).await?;
        Ok(Self { pool })
    }

    /// A fresh execution context with no transaction bound.
    pub fn context(&self) -> TransactionContext<'_, D> {
        TransactionContext::new(self)
    }

    pub fn pool(&self) -> &ConnectionPool<D> {
        &self.pool
    }

    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        self.context().execute(sql, params).await
    }

    /// Run `f` in a new transaction. See [`TransactionContext::transaction`].
    pub async fn transaction<'db, T, F>(&'db self, f: F) -> DbResult<T>
    where
        F: AsyncFnOnce(&mut TransactionContext<'db, D>) -> DbResult<T>,
    {
        self.context().transaction(f).await
    }

    pub async fn run(&self, query: QueryBuilder) -> DbResult<QueryResult> {
        self.context().run(query).await
    }

    /// Run a built query as its own transaction.
    pub async fn run_in_transaction(&self, query: QueryBuilder) -> DbResult<QueryResult> {
        self.transaction(async move |tx| tx.run(query).await).await
    }

    /// `SELECT * FROM <table>`
    pub async fn select(&self, table: &str) -> DbResult<QueryResult> {
        self.run(QueryBuilder::new().select(table)).await
    }

    pub async fn insert<I, K, V>(&self, table: &str, values: I) -> DbResult<QueryResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.run(QueryBuilder::new().insert(table, values)).await
    }

    /// `UPDATE <table> SET ... WHERE <condition>`; set values bind before
    /// `where_params`.
    pub async fn update<I, K, V>(
        &self,
        table: &str,
        values: I,
        condition: &str,
        where_params: &[QueryParam],
    ) -> DbResult<QueryResult>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        let query = QueryBuilder::new()
            .update(table, values)
            .filter(condition)
            .params(where_params.iter().cloned());
        self.run(query).await
    }

    pub async fn delete(
        &self,
        table: &str,
        condition: &str,
        where_params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let query = QueryBuilder::new()
            .delete(table)
            .filter(condition)
            .params(where_params.iter().cloned());
        self.run(query).await
    }

    /// Close the pool. Further statements fail with a connection error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn is_closed(&self) -> bool {
        self.pool.is_closed().await
    }
}
