//! Bulk loading with COPY INTO.

use snafu::prelude::*;
use std::fmt;
use tracing::{error, info, warn};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::{FileProcessed, FileStatus, FileStep, RowsLoaded};

use crate::config::Config;
use crate::discovery::FileRef;
use crate::error::{CopySnafu, LoadError, NoFilesSnafu};
use crate::provision::ObjectNames;
use crate::schema::table_name;
use crate::sql;
use crate::warehouse::{ResultSet, WarehouseRef};

const LOAD_FAILED: &str = "LOAD_FAILED";

/// What the load step did for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        rows_loaded: u64,
        errors_seen: u64,
        /// Distinct statuses reported by the warehouse (e.g. `LOADED`).
        statuses: Vec<String>,
        first_error: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl LoadOutcome {
    /// Loaded, partially loaded or already loaded, with no row reporting
    /// `LOAD_FAILED`.
    pub fn is_success(&self) -> bool {
        match self {
            LoadOutcome::Loaded { statuses, .. } => !statuses.iter().any(|s| s == LOAD_FAILED),
            LoadOutcome::Failed { .. } => false,
        }
    }

    /// Summarise the rows COPY INTO returns, one per matched file.
    ///
    /// When nothing matched (or the file was loaded before) the warehouse
    /// returns a single `status` row and no counts.
    pub fn from_copy_result(rows: &ResultSet) -> Self {
        let count = |row: usize, column: &str| {
            rows.value(row, column)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        let mut rows_loaded = 0;
        let mut errors_seen = 0;
        let mut statuses: Vec<String> = Vec::new();
        let mut first_error = None;

        for row in 0..rows.len() {
            rows_loaded += count(row, "rows_loaded");
            errors_seen += count(row, "errors_seen");
            if let Some(status) = rows.value(row, "status") {
                if !statuses.iter().any(|s| s == status) {
                    statuses.push(status.to_string());
                }
            }
            if first_error.is_none() {
                first_error = rows
                    .value(row, "first_error")
                    .filter(|e| !e.is_empty())
                    .map(str::to_string);
            }
        }

        LoadOutcome::Loaded {
            rows_loaded,
            errors_seen,
            statuses,
            first_error,
        }
    }

    fn status(&self) -> FileStatus {
        if self.is_success() {
            FileStatus::Success
        } else {
            FileStatus::Failed
        }
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOutcome::Loaded {
                rows_loaded,
                errors_seen,
                statuses,
                ..
            } => write!(
                f,
                "{} ({rows_loaded} rows, {errors_seen} errors)",
                statuses.join(", ")
            ),
            LoadOutcome::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Issues one COPY INTO per file.
pub struct Loader {
    warehouse: WarehouseRef,
    names: ObjectNames,
    bucket: String,
    prefix: String,
}

impl Loader {
    pub fn new(warehouse: WarehouseRef, config: &Config) -> Self {
        Self {
            warehouse,
            names: ObjectNames::from_config(config),
            bucket: config.storage.bucket.clone(),
            prefix: config.storage.prefix.clone(),
        }
    }

    pub fn statement(&self, file: &FileRef) -> String {
        let table = self
            .names
            .table(&table_name(&self.names.table_prefix, file));
        let pattern = sql::file_pattern(&self.bucket, &self.prefix, file.relative_to(&self.prefix));
        sql::copy_into(&table, &self.names.stage, &pattern, &self.names.file_format)
    }

    /// Load one file into its table.
    pub async fn load_file(&self, file: &FileRef) -> Result<LoadOutcome, LoadError> {
        let table = table_name(&self.names.table_prefix, file);
        let rows = self
            .warehouse
            .query(&self.statement(file))
            .await
            .context(CopySnafu { table: &table })?;
        let outcome = LoadOutcome::from_copy_result(&rows);

        if let LoadOutcome::Loaded {
            rows_loaded,
            errors_seen,
            ..
        } = &outcome
        {
            emit!(RowsLoaded {
                rows: *rows_loaded,
                errors: *errors_seen,
                table,
            });
        }

        Ok(outcome)
    }

    /// Load every file in order. Fails only when `files` is empty; a failed
    /// COPY for one file is recorded and the next file is loaded.
    pub async fn load_all(&self, files: &[FileRef]) -> Result<Vec<LoadOutcome>, LoadError> {
        ensure!(!files.is_empty(), NoFilesSnafu);

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = match self.load_file(file).await {
                Ok(outcome) => {
                    if let LoadOutcome::Loaded {
                        rows_loaded,
                        errors_seen,
                        statuses,
                        first_error,
                    } = &outcome
                    {
                        let status = statuses.join(", ");
                        if *errors_seen > 0 || !outcome.is_success() {
                            warn!(
                                file = %file.key,
                                status = %status,
                                rows_loaded,
                                errors_seen,
                                first_error = first_error.as_deref().unwrap_or_default(),
                                "Loaded with errors"
                            );
                        } else {
                            info!(file = %file.key, status = %status, rows_loaded, "Loaded file");
                        }
                    }
                    outcome
                }
                Err(e) => {
                    error!(file = %file.key, error = %e, "Load failed");
                    LoadOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            emit!(FileProcessed {
                step: FileStep::Load,
                status: outcome.status(),
            });
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_result(rows: &[[&str; 4]]) -> ResultSet {
        ResultSet::new(
            ["file", "status", "rows_loaded", "errors_seen"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Some(v.to_string())).collect())
                .collect(),
        )
    }

    #[test]
    fn test_copy_result_loaded() {
        let outcome = LoadOutcome::from_copy_result(&copy_result(&[[
            "s3://landing/raw_data/a.csv",
            "LOADED",
            "42",
            "0",
        ]]));

        assert_eq!(
            outcome,
            LoadOutcome::Loaded {
                rows_loaded: 42,
                errors_seen: 0,
                statuses: vec!["LOADED".to_string()],
                first_error: None,
            }
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn test_copy_result_partial_counts_as_success() {
        let outcome = LoadOutcome::from_copy_result(&copy_result(&[[
            "s3://landing/raw_data/a.csv",
            "PARTIALLY_LOADED",
            "40",
            "2",
        ]]));
        assert!(outcome.is_success());
        assert_eq!(outcome.to_string(), "PARTIALLY_LOADED (40 rows, 2 errors)");
    }

    #[test]
    fn test_copy_result_load_failed() {
        let outcome = LoadOutcome::from_copy_result(&copy_result(&[[
            "s3://landing/raw_data/a.csv",
            "LOAD_FAILED",
            "0",
            "10",
        ]]));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_copy_result_nothing_to_load() {
        let rows = ResultSet::new(
            vec!["status".to_string()],
            vec![vec![Some("Copy executed with 0 files processed.".to_string())]],
        );
        let outcome = LoadOutcome::from_copy_result(&rows);
        assert!(outcome.is_success());
        assert!(matches!(outcome, LoadOutcome::Loaded { rows_loaded: 0, .. }));
    }

    #[test]
    fn test_copy_result_mixed_statuses_with_failure() {
        let outcome = LoadOutcome::from_copy_result(&copy_result(&[
            ["s3://landing/raw_data/a.csv", "LOADED", "42", "0"],
            ["s3://landing/raw_data/2024/a.csv", "LOAD_FAILED", "0", "10"],
        ]));
        assert!(!outcome.is_success());
        assert_eq!(outcome.status(), FileStatus::Failed);
        assert_eq!(outcome.to_string(), "LOADED, LOAD_FAILED (42 rows, 10 errors)");
    }

    #[test]
    fn test_failed_is_not_success() {
        assert!(
            !LoadOutcome::Failed {
                error: "x".to_string()
            }
            .is_success()
        );
    }
}
