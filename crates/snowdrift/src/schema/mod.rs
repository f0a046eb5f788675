//! Schema reconciliation.
//!
//! For each discovered file the header row and the warehouse's inferred
//! types are zipped positionally into a [`TableSpec`], and the table is
//! created if it does not exist yet. Existing tables are never altered, so
//! the first file to reach a table decides its schema.

mod header;
mod inference;

pub use header::parse_header;
pub use inference::{InferredColumn, parse_inferred, parse_nullable};

use snafu::prelude::*;
use std::fmt;
use tracing::{error, info, warn};

use snowdrift_core::StorageProviderRef;
use snowdrift_core::emit;
use snowdrift_core::metrics::events::{FileProcessed, FileStatus, FileStep};

use crate::config::{Config, HEADER_READ_LIMIT};
use crate::discovery::FileRef;
use crate::error::{
    ColumnCountMismatchSnafu, CreateTableSnafu, InferenceSnafu, InvalidTypeSnafu,
    ReadHeaderSnafu, ReconcileError,
};
use crate::provision::ObjectNames;
use crate::sql::{self, ColumnDef, DataType};
use crate::warehouse::{ResultSet, WarehouseRef};

/// Deterministic table name for a file: prefix plus the lower-cased stem.
pub fn table_name(prefix: &str, file: &FileRef) -> String {
    format!("{prefix}{}", file.stem().to_lowercase())
}

/// A table definition ready to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

/// Zip header names with inferred types. The two must have the same length.
pub fn reconcile(
    key: &str,
    table: &str,
    header: &[String],
    inferred: &[InferredColumn],
) -> Result<TableSpec, ReconcileError> {
    ensure!(
        header.len() == inferred.len(),
        ColumnCountMismatchSnafu {
            key,
            header: header.len(),
            inferred: inferred.len(),
        }
    );

    let columns = header
        .iter()
        .zip(inferred)
        .map(|(name, column)| {
            let data_type = DataType::parse(&column.data_type)
                .context(InvalidTypeSnafu { key, column: name })?;
            Ok(ColumnDef {
                name: name.clone(),
                data_type,
                nullable: column.nullable,
            })
        })
        .collect::<Result<Vec<_>, ReconcileError>>()?;

    Ok(TableSpec {
        table: table.to_string(),
        columns,
    })
}

/// What the table step did for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    AlreadyExists,
    /// CREATE succeeded but its status did not say which.
    Ensured,
    Skipped { reason: String },
    Failed { error: String },
}

impl TableOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TableOutcome::Created | TableOutcome::AlreadyExists | TableOutcome::Ensured
        )
    }

    /// Interpret the status row of CREATE TABLE IF NOT EXISTS.
    pub fn from_create_result(rows: &ResultSet) -> Self {
        let status = rows
            .value(0, "status")
            .or_else(|| rows.rows.first()?.first()?.as_deref())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if status.contains("already exists") {
            TableOutcome::AlreadyExists
        } else if status.contains("successfully created") {
            TableOutcome::Created
        } else {
            TableOutcome::Ensured
        }
    }

    fn status(&self) -> FileStatus {
        match self {
            TableOutcome::Skipped { .. } => FileStatus::Skipped,
            TableOutcome::Failed { .. } => FileStatus::Failed,
            _ => FileStatus::Success,
        }
    }
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Created => f.write_str("created"),
            TableOutcome::AlreadyExists => f.write_str("already exists"),
            TableOutcome::Ensured => f.write_str("ensured"),
            TableOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            TableOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Ensures a table exists for each discovered file.
pub struct Reconciler {
    warehouse: WarehouseRef,
    storage: StorageProviderRef,
    names: ObjectNames,
    prefix: String,
    delimiter: u8,
    quote: u8,
}

impl Reconciler {
    pub fn new(warehouse: WarehouseRef, storage: StorageProviderRef, config: &Config) -> Self {
        Self {
            warehouse,
            storage,
            names: ObjectNames::from_config(config),
            prefix: config.storage.prefix.clone(),
            delimiter: config.format.delimiter as u8,
            quote: config.format.quote as u8,
        }
    }

    /// Table name a file loads into.
    pub fn table_for(&self, file: &FileRef) -> String {
        table_name(&self.names.table_prefix, file)
    }

    /// Build the table definition for one file without creating it.
    pub async fn table_spec(&self, file: &FileRef) -> Result<TableSpec, ReconcileError> {
        let key = file.key.as_str();
        let line = self
            .storage
            .read_first_line(key, HEADER_READ_LIMIT)
            .await
            .context(ReadHeaderSnafu { key })?;
        let header = parse_header(key, &line, self.delimiter, self.quote)?;

        let statement = sql::infer_schema(
            &self.names.stage,
            file.relative_to(&self.prefix),
            &self.names.file_format,
        );
        let rows = self
            .warehouse
            .query(&statement)
            .await
            .context(InferenceSnafu { key })?;
        let inferred = parse_inferred(key, &rows)?;

        if header.len() != inferred.len() {
            let inferred_names: Vec<&str> = inferred.iter().map(|c| c.name.as_str()).collect();
            warn!(
                file = key,
                header = ?header,
                inferred = ?inferred_names,
                "Header and inferred schema disagree"
            );
        }

        reconcile(key, &self.table_for(file), &header, &inferred)
    }

    /// Ensure the table for one file exists.
    pub async fn ensure_table(&self, file: &FileRef) -> Result<TableOutcome, ReconcileError> {
        let spec = self.table_spec(file).await?;
        let table = self.names.table(&spec.table);
        let rows = self
            .warehouse
            .query(&sql::create_table(&table, &spec.columns))
            .await
            .context(CreateTableSnafu { table: &spec.table })?;
        Ok(TableOutcome::from_create_result(&rows))
    }

    /// Ensure tables for every file in order. A failure for one file is
    /// logged and recorded; the rest are still processed.
    pub async fn ensure_tables(&self, files: &[FileRef]) -> Vec<TableOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());

        for file in files {
            let table = self.table_for(file);
            let outcome = match self.ensure_table(file).await {
                Ok(outcome) => {
                    info!(file = %file.key, table = %table, outcome = %outcome, "Table ready");
                    outcome
                }
                Err(e) if e.is_skip() => {
                    warn!(file = %file.key, table = %table, error = %e, "Skipping table creation");
                    TableOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    error!(file = %file.key, table = %table, error = %e, "Table creation failed");
                    TableOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            emit!(FileProcessed {
                step: FileStep::Table,
                status: outcome.status(),
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inferred(types: &[(&str, bool)]) -> Vec<InferredColumn> {
        types
            .iter()
            .enumerate()
            .map(|(ordinal, (data_type, nullable))| InferredColumn {
                ordinal,
                name: format!("c{ordinal}"),
                data_type: data_type.to_string(),
                nullable: *nullable,
            })
            .collect()
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_table_name_is_lowercased_stem() {
        let file = FileRef::new("landing", "raw_data/Orders.CSV").unwrap();
        assert_eq!(table_name("raw_", &file), "raw_orders");
        assert_eq!(table_name("", &file), "orders");
    }

    #[test]
    fn test_reconcile_zips_positionally() {
        let spec = reconcile(
            "a.csv",
            "raw_a",
            &header(&["id", "name"]),
            &inferred(&[("NUMBER(38, 0)", false), ("TEXT", true)]),
        )
        .unwrap();

        assert_eq!(spec.table, "raw_a");
        assert_eq!(spec.columns[0].name, "id");
        assert_eq!(spec.columns[0].data_type.as_str(), "NUMBER(38, 0)");
        assert!(!spec.columns[0].nullable);
        assert_eq!(spec.columns[1].name, "name");
        assert!(spec.columns[1].nullable);
    }

    #[test]
    fn test_reconcile_rejects_length_mismatch() {
        let err = reconcile(
            "b.csv",
            "raw_b",
            &header(&["id", "name", "extra"]),
            &inferred(&[("NUMBER", true), ("TEXT", true)]),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::ColumnCountMismatch {
                header: 3,
                inferred: 2,
                ..
            }
        ));
        assert!(err.is_skip());
    }

    #[test]
    fn test_reconcile_rejects_invalid_type() {
        let err = reconcile(
            "a.csv",
            "raw_a",
            &header(&["id"]),
            &inferred(&[("TEXT); DROP TABLE x; --", true)]),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidType { .. }));
    }

    #[test]
    fn test_outcome_from_create_status() {
        let rows = |status: &str| {
            ResultSet::new(vec!["status".to_string()], vec![vec![Some(status.to_string())]])
        };

        assert_eq!(
            TableOutcome::from_create_result(&rows("Table RAW_A successfully created.")),
            TableOutcome::Created
        );
        assert_eq!(
            TableOutcome::from_create_result(&rows(
                "RAW_A already exists, statement succeeded."
            )),
            TableOutcome::AlreadyExists
        );
        assert_eq!(
            TableOutcome::from_create_result(&ResultSet::default()),
            TableOutcome::Ensured
        );
    }
}
