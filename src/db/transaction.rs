//! Transaction scoping.
//!
//! A [`TransactionContext`] is the caller's execution unit: it remembers which
//! pooled connection its active transaction runs on, so statements and nested
//! `transaction` calls made through the same context reuse that connection.
//! Nested transactions are flattened into the outermost one; there are no
//! savepoints.

use crate::db::builder::QueryBuilder;
use crate::db::database::Database;
use crate::db::pool::PooledConnection;
use crate::driver::{Driver, SqlxDriver};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use tracing::{debug, warn};

struct Binding<D: Driver> {
    conn: PooledConnection<D>,
    saved_auto_commit: bool,
}

/// Execution context carrying the connection bound to the active transaction.
///
/// Create one with [`Database::context`] and pass it down the call chain.
/// Dropping a context while a transaction is bound returns the connection
/// to the pool, which rolls it back.
pub struct TransactionContext<'db, D: Driver = SqlxDriver> {
    db: &'db Database<D>,
    binding: Option<Binding<D>>,
}

impl<D: Driver> std::fmt::Debug for TransactionContext<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field(
                "connection",
                &self.binding.as_ref().map(|binding| binding.conn.id()),
            )
            .finish()
    }
}

impl<'db, D: Driver> TransactionContext<'db, D> {
    pub(crate) fn new(db: &'db Database<D>) -> Self {
        Self { db, binding: None }
    }

    /// Whether a transaction is active on this context.
    pub fn is_in_transaction(&self) -> bool {
        self.binding.is_some()
    }

    pub fn database(&self) -> &'db Database<D> {
        self.db
    }

    /// Execute one statement.
    ///
    /// Inside a transaction the bound connection is used and kept; otherwise
    /// a connection is acquired for this statement alone and released
    /// afterwards, whatever the outcome.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        if let Some(binding) = &self.binding {
            return binding
                .conn
                .execute(sql, params)
                .await
                .map_err(|e| DbError::query(sql, e));
        }

        let pool = self.db.pool();
        let conn = pool.acquire().await?;
        let result = conn.execute(sql, params).await;
        pool.release(conn).await;

        result.map_err(|e| DbError::query(sql, e))
    }

    /// Execute a built query.
    pub async fn run(&self, query: QueryBuilder) -> DbResult<QueryResult> {
        let (sql, params) = query.build()?;
        self.execute(&sql, &params).await
    }

    /// Run `f` inside a transaction.
    ///
    /// When this context already has an active transaction, `f` joins it and
    /// its result is returned untouched; commit or rollback is left to the
    /// outermost call. Otherwise a connection is acquired and bound, `f` runs,
    /// and the transaction is committed on `Ok` or rolled back on `Err`. A
    /// failed commit also rolls back. Failures come back as
    /// [`DbError::Transaction`] with the original cause and, if rolling back
    /// failed too, the rollback error.
    ///
    /// ```ignore
    /// let id = ctx.transaction(async |tx| {
    ///     tx.execute("INSERT INTO users (name) VALUES (?)", params!["Alice"]).await?;
    ///     let row = tx.execute("SELECT last_insert_rowid() AS id", params![]).await?;
    ///     Ok(row.first().and_then(|r| r["id"].as_i64()))
    /// }).await?;
    /// ```
    pub async fn transaction<T, F>(&mut self, f: F) -> DbResult<T>
    where
        F: AsyncFnOnce(&mut TransactionContext<'db, D>) -> DbResult<T>,
    {
        if self.binding.is_some() {
            debug!("Joining active transaction");
            return f(self).await;
        }

        let conn = self.db.pool().acquire().await?;
        let connection_id = conn.id();
        let saved_auto_commit = conn.auto_commit().await;
        let begun = conn.set_auto_commit(false).await;
        self.binding = Some(Binding {
            conn,
            saved_auto_commit,
        });
        debug!(connection_id = %connection_id, "Transaction started");

        let outcome = match begun {
            Ok(()) => f(&mut *self).await,
            Err(e) => Err(DbError::Driver(e)),
        };

        // Unbind before finishing so nothing else can run on the connection
        let Some(Binding {
            conn,
            saved_auto_commit,
        }) = self.binding.take()
        else {
            return Err(DbError::connection(
                "Transaction connection was unbound while active",
                None,
            ));
        };

        let outcome = match outcome {
            Ok(value) => conn.commit().await.map(|_| value).map_err(DbError::Driver),
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(value) => {
                debug!(connection_id = %connection_id, "Transaction committed");
                Ok(value)
            }
            Err(cause) => {
                let rollback_error = conn.rollback().await.err();
                match &rollback_error {
                    Some(e) => warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Rollback after failed transaction failed"
                    ),
                    None => debug!(connection_id = %connection_id, "Transaction rolled back"),
                }
                Err(DbError::transaction(cause, rollback_error))
            }
        };

        if let Err(e) = conn.set_auto_commit(saved_auto_commit).await {
            debug!(connection_id = %connection_id, error = %e, "Failed to restore auto-commit");
        }
        self.db.pool().release(conn).await;

        result
    }
}
