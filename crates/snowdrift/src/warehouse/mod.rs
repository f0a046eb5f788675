//! Warehouse SQL interface.
//!
//! The pipeline depends only on the [`Warehouse`] trait; [`SnowflakeClient`]
//! is the production implementation and tests substitute a recording fake.

mod snowflake;

pub use snowflake::SnowflakeClient;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::WarehouseError;

/// Rows returned by a statement. Values arrive as text (or NULL).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Position of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    /// Value of a named column in a row, `None` for NULL or a missing column.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Something that executes SQL statements one at a time.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a statement and return its rows.
    async fn query(&self, sql: &str) -> Result<ResultSet, WarehouseError>;

    /// Run a statement, discarding its rows.
    async fn execute(&self, sql: &str) -> Result<(), WarehouseError> {
        self.query(sql).await.map(|_| ())
    }
}

pub type WarehouseRef = Arc<dyn Warehouse>;
