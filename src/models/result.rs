//! Materialized statement results.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One result row: column name to value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// The outcome of a single statement: either a fully materialized row set or
/// an update count, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    Rows { columns: Vec<String>, rows: Vec<Row> },
    Update { rows_affected: u64 },
}

impl QueryResult {
    /// Create a row-set result.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self::Rows { columns, rows }
    }

    /// Create a result for write operations (INSERT/UPDATE/DELETE/DDL).
    pub fn from_update_count(rows_affected: u64) -> Self {
        Self::Update { rows_affected }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }

    /// Affected row count, `None` for row sets.
    pub fn update_count(&self) -> Option<u64> {
        match self {
            Self::Update { rows_affected } => Some(*rows_affected),
            Self::Rows { .. } => None,
        }
    }

    /// All rows; empty for update results.
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Rows { rows, .. } => rows,
            Self::Update { .. } => &[],
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows { rows, .. } => rows,
            Self::Update { .. } => Vec::new(),
        }
    }

    /// Column names in result order; empty for update results.
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Rows { columns, .. } => columns,
            Self::Update { .. } => &[],
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows().first()
    }

    /// Get the number of rows in the result.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Values of one column across all rows. Rows without the column yield `Null`.
    pub fn column(&self, name: &str) -> Vec<JsonValue> {
        self.rows()
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(JsonValue::Null))
            .collect()
    }

    /// Map every row through `mapper`.
    pub fn map<T, F>(&self, mapper: F) -> Vec<T>
    where
        F: FnMut(&Row) -> T,
    {
        self.rows().iter().map(mapper).collect()
    }
}
