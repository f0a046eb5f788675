//! Per-file and per-run outcome records.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::archive::ArchiveOutcome;
use crate::discovery::FileRef;
use crate::load::LoadOutcome;
use crate::schema::TableOutcome;

/// Everything that happened to one discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: FileRef,
    /// Unqualified table name the file maps to.
    pub table_name: String,
    pub table: TableOutcome,
    pub load: LoadOutcome,
    pub archive: ArchiveOutcome,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn tables_created(&self) -> usize {
        self.count(|f| f.table == TableOutcome::Created)
    }

    pub fn tables_skipped(&self) -> usize {
        self.count(|f| matches!(f.table, TableOutcome::Skipped { .. }))
    }

    pub fn files_loaded(&self) -> usize {
        self.count(|f| f.load.is_success())
    }

    pub fn files_archived(&self) -> usize {
        self.count(|f| matches!(f.archive, ArchiveOutcome::Archived { .. }))
    }

    pub fn rows_loaded(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.load {
                LoadOutcome::Loaded { rows_loaded, .. } => rows_loaded,
                _ => 0,
            })
            .sum()
    }

    /// Files with any failed step.
    pub fn failures(&self) -> Vec<&FileReport> {
        self.files
            .iter()
            .filter(|f| {
                matches!(f.table, TableOutcome::Failed { .. })
                    || matches!(f.load, LoadOutcome::Failed { .. })
                    || matches!(
                        f.archive,
                        ArchiveOutcome::Failed { .. } | ArchiveOutcome::Duplicated { .. }
                    )
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&FileReport) -> bool) -> usize {
        self.files.iter().filter(|f| predicate(f)).count()
    }

    pub fn log_summary(&self) {
        let duration = self.finished_at - self.started_at;
        info!(
            files = self.files.len(),
            tables_created = self.tables_created(),
            tables_skipped = self.tables_skipped(),
            files_loaded = self.files_loaded(),
            rows_loaded = self.rows_loaded(),
            files_archived = self.files_archived(),
            duration_ms = duration.num_milliseconds(),
            "Run completed"
        );

        for report in self.failures() {
            warn!(
                file = %report.file.key,
                table = %report.table_name,
                table_outcome = %report.table,
                load = %report.load,
                archive = %report.archive,
                "File did not complete cleanly"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(table: TableOutcome, load: LoadOutcome, archive: ArchiveOutcome) -> FileReport {
        FileReport {
            file: FileRef::new("landing", "raw_data/a.csv").unwrap(),
            table_name: "raw_a".to_string(),
            table,
            load,
            archive,
        }
    }

    #[test]
    fn test_counts() {
        let now = Utc::now();
        let run = RunReport {
            files: vec![
                report(
                    TableOutcome::Created,
                    LoadOutcome::Loaded {
                        rows_loaded: 10,
                        errors_seen: 0,
                        statuses: vec!["LOADED".to_string()],
                        first_error: None,
                    },
                    ArchiveOutcome::Archived {
                        to: "archive/a.csv".to_string(),
                    },
                ),
                report(
                    TableOutcome::Skipped {
                        reason: "mismatch".to_string(),
                    },
                    LoadOutcome::Failed {
                        error: "no table".to_string(),
                    },
                    ArchiveOutcome::Duplicated {
                        to: "archive/b.csv".to_string(),
                        error: "denied".to_string(),
                    },
                ),
            ],
            started_at: now,
            finished_at: now,
        };

        assert_eq!(run.tables_created(), 1);
        assert_eq!(run.tables_skipped(), 1);
        assert_eq!(run.files_loaded(), 1);
        assert_eq!(run.rows_loaded(), 10);
        assert_eq!(run.files_archived(), 1);
        assert_eq!(run.failures().len(), 1);
    }
}
