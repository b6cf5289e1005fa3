//! Fluent SQL construction.
//!
//! `QueryBuilder` only assembles text and positional parameters; it is run
//! through [`Database::run`](crate::db::Database::run) or
//! [`TransactionContext::run`](crate::db::TransactionContext::run).
//! Table and column names are inserted verbatim, so they must come from
//! trusted code, never from user input. Values always travel as parameters.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    sql: Option<String>,
    params: Vec<QueryParam>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use raw SQL, replacing anything built so far.
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn param(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<QueryParam>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// `SELECT * FROM <table>`
    pub fn select(mut self, table: &str) -> Self {
        self.sql = Some(format!("SELECT * FROM {table}"));
        self
    }

    /// `SELECT <columns> FROM <table>`
    pub fn select_columns(mut self, table: &str, columns: &[&str]) -> Self {
        self.sql = Some(format!("SELECT {} FROM {}", columns.join(", "), table));
        self
    }

    /// Append a `WHERE` clause.
    pub fn filter(self, condition: &str) -> Self {
        self.append(&format!(" WHERE {condition}"))
    }

    pub fn order_by(self, columns: &[&str]) -> Self {
        self.append(&format!(" ORDER BY {}", columns.join(", ")))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.append(&format!(" LIMIT {limit}"))
    }

    /// `INSERT INTO <table> (<cols>) VALUES (?, ...)`, values bound in pair order.
    pub fn insert<I, K, V>(mut self, table: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        let mut columns = Vec::new();
        for (column, value) in values {
            columns.push(column.into());
            self.params.push(value.into());
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        self.sql = Some(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        ));
        self
    }

    /// `UPDATE <table> SET <col> = ?, ...`, values bound in pair order.
    pub fn update<I, K, V>(mut self, table: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        let mut sets = Vec::new();
        for (column, value) in values {
            sets.push(format!("{} = ?", column.into()));
            self.params.push(value.into());
        }
        self.sql = Some(format!("UPDATE {} SET {}", table, sets.join(", ")));
        self
    }

    /// `DELETE FROM <table>`
    pub fn delete(mut self, table: &str) -> Self {
        self.sql = Some(format!("DELETE FROM {table}"));
        self
    }

    fn append(mut self, clause: &str) -> Self {
        self.sql.get_or_insert_with(String::new).push_str(clause);
        self
    }

    /// SQL text built so far.
    pub fn sql_text(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn parameters(&self) -> &[QueryParam] {
        &self.params
    }

    /// Finish into SQL text and parameters.
    pub fn build(self) -> DbResult<(String, Vec<QueryParam>)> {
        match self.sql {
            Some(sql) if !sql.trim().is_empty() => Ok((sql, self.params)),
            _ => Err(DbError::invalid_query("SQL query is empty", "")),
        }
    }
}
