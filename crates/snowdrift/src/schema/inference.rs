//! Interpreting INFER_SCHEMA output.

use snafu::prelude::*;

use crate::error::{InferenceResultSnafu, ReconcileError};
use crate::warehouse::ResultSet;

/// One column proposed by schema inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredColumn {
    pub ordinal: usize,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Only an explicit negative marks a column NOT NULL.
pub fn parse_nullable(value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_uppercase()) {
        Some(v) => !matches!(v.as_str(), "FALSE" | "NO" | "N" | "0"),
        None => true,
    }
}

/// Read inference rows, ordered by `ORDER_ID` (row order when absent).
pub fn parse_inferred(key: &str, rows: &ResultSet) -> Result<Vec<InferredColumn>, ReconcileError> {
    let mut columns = Vec::with_capacity(rows.len());

    for row in 0..rows.len() {
        let data_type = rows.value(row, "TYPE").context(InferenceResultSnafu {
            key,
            reason: format!("row {row} has no TYPE"),
        })?;

        let ordinal = match rows.value(row, "ORDER_ID") {
            Some(value) => value.trim().parse::<usize>().ok().context(InferenceResultSnafu {
                key,
                reason: format!("row {row} has ORDER_ID '{value}'"),
            })?,
            None => row,
        };

        columns.push(InferredColumn {
            ordinal,
            name: rows.value(row, "COLUMN_NAME").unwrap_or_default().to_string(),
            data_type: data_type.to_string(),
            nullable: parse_nullable(rows.value(row, "NULLABLE")),
        });
    }

    columns.sort_by_key(|column| column.ordinal);
    Ok(columns)
}
