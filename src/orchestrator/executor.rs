//! Query execution collaborator.
//!
//! The compilers only produce SQL text. Running it belongs to whoever
//! implements [`QueryExecutor`]: a warehouse client, a local DuckDB, or a
//! test double.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutionError;

/// A rectangular query result with JSON-typed cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Result of a statement that returns no rows (DDL).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Position of `name`, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deserialize every row into `T`, keyed by column name.
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, ExecutionError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != self.columns.len() {
                    return Err(ExecutionError::new(format!(
                        "row {} has {} values for {} columns",
                        i,
                        row.len(),
                        self.columns.len()
                    )));
                }
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                serde_json::from_value(Value::Object(object))
                    .map_err(|e| ExecutionError::new(format!("row {}: {}", i, e)))
            })
            .collect()
    }
}

/// Executes SQL text to completion.
///
/// Implementations must not return before the statement has finished: the
/// percentile statement reads the table the funnel statement creates.
/// Failures are reported as opaque messages and are never retried by the
/// orchestrator.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError>;
}
