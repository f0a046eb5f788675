//! Moving processed files under the archive prefix.
//!
//! A move is a copy followed by a delete. If the delete fails the object is
//! left at both keys; it is never removed before the copy has succeeded.

use snafu::prelude::*;
use std::fmt;
use tracing::{error, info};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::{FileProcessed, FileStatus, FileStep};
use snowdrift_core::StorageProviderRef;

use crate::config::{ArchivePolicy, Config};
use crate::discovery::FileRef;
use crate::error::{ArchiveCopySnafu, ArchiveDeleteSnafu, ArchiveError};
use crate::load::LoadOutcome;
use crate::schema::TableOutcome;

/// Destination key: the leading `prefix` is replaced by `archive_prefix`.
/// Keys outside `prefix` are placed under `archive_prefix` whole.
pub fn archive_key(key: &str, prefix: &str, archive_prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let archive_prefix = archive_prefix.trim_matches('/');
    let relative = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|_| !prefix.is_empty())
        .unwrap_or(key);
    format!("{archive_prefix}/{relative}")
}

impl ArchivePolicy {
    /// Whether a file with these outcomes should be archived.
    pub fn allows(&self, table: &TableOutcome, load: &LoadOutcome) -> bool {
        match self {
            ArchivePolicy::AnyOutcome => true,
            ArchivePolicy::SuccessOnly => table.is_success() && load.is_success(),
        }
    }
}

/// What the archive step did for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived { to: String },
    /// Copied, but the original could not be deleted.
    Duplicated { to: String, error: String },
    /// Copy failed; the original is untouched.
    Failed { error: String },
    /// Kept in place by the archive policy.
    Retained,
}

impl ArchiveOutcome {
    fn status(&self) -> FileStatus {
        match self {
            ArchiveOutcome::Archived { .. } => FileStatus::Success,
            ArchiveOutcome::Retained => FileStatus::Skipped,
            _ => FileStatus::Failed,
        }
    }
}

impl fmt::Display for ArchiveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveOutcome::Archived { to } => write!(f, "archived to {to}"),
            ArchiveOutcome::Duplicated { to, error } => {
                write!(f, "copied to {to} but original kept: {error}")
            }
            ArchiveOutcome::Failed { error } => write!(f, "failed: {error}"),
            ArchiveOutcome::Retained => f.write_str("retained"),
        }
    }
}

pub struct Archiver {
    storage: StorageProviderRef,
    prefix: String,
    archive_prefix: String,
    policy: ArchivePolicy,
}

impl Archiver {
    pub fn new(storage: StorageProviderRef, config: &Config) -> Self {
        Self {
            storage,
            prefix: config.storage.prefix.clone(),
            archive_prefix: config.storage.archive_prefix.clone(),
            policy: config.archive.policy,
        }
    }

    pub fn policy(&self) -> ArchivePolicy {
        self.policy
    }

    pub fn destination(&self, file: &FileRef) -> String {
        archive_key(&file.key, &self.prefix, &self.archive_prefix)
    }

    /// Copy one file to the archive prefix, then delete the original.
    pub async fn archive_file(&self, file: &FileRef) -> Result<String, ArchiveError> {
        let to = self.destination(file);
        self.storage
            .copy(&file.key, &to)
            .await
            .context(ArchiveCopySnafu {
                from: &file.key,
                to: &to,
            })?;
        self.storage
            .delete(&file.key)
            .await
            .context(ArchiveDeleteSnafu {
                key: &file.key,
                to: &to,
            })?;
        Ok(to)
    }

    /// Archive each file; failures are logged and recorded per file.
    pub async fn archive_files(&self, files: &[&FileRef]) -> Vec<ArchiveOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());

        for file in files {
            let outcome = match self.archive_file(file).await {
                Ok(to) => {
                    info!(file = %file.key, to = %to, "Archived file");
                    ArchiveOutcome::Archived { to }
                }
                Err(ArchiveError::ArchiveDelete { to, source, .. }) => {
                    error!(
                        file = %file.key,
                        to = %to,
                        error = %source,
                        "Archived copy written but original could not be deleted"
                    );
                    ArchiveOutcome::Duplicated {
                        to,
                        error: source.to_string(),
                    }
                }
                Err(e) => {
                    error!(file = %file.key, error = %e, "Archive failed, file retained");
                    ArchiveOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            emit!(FileProcessed {
                step: FileStep::Archive,
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
    use snowdrift_core::StorageProvider;
    use std::sync::Arc;

    fn archiver(storage: StorageProviderRef) -> Archiver {
        Archiver {
            storage,
            prefix: "raw_data".to_string(),
            archive_prefix: "archive".to_string(),
            policy: ArchivePolicy::AnyOutcome,
        }
    }

    #[test]
    fn test_archive_key_replaces_leading_prefix_only() {
        assert_eq!(archive_key("raw_data/a.csv", "raw_data", "archive"), "archive/a.csv");
        assert_eq!(
            archive_key("raw_data/2024/raw_data.csv", "raw_data/", "/archive/"),
            "archive/2024/raw_data.csv"
        );
        assert_eq!(archive_key("raw_data_x/a.csv", "raw_data", "archive"), "archive/raw_data_x/a.csv");
        assert_eq!(archive_key("a.csv", "", "archive"), "archive/a.csv");
    }

    #[test]
    fn test_policy() {
        let loaded = LoadOutcome::Loaded {
            rows_loaded: 1,
            errors_seen: 0,
            statuses: vec!["LOADED".to_string()],
            first_error: None,
        };
        let failed = LoadOutcome::Failed {
            error: "x".to_string(),
        };
        let skipped = TableOutcome::Skipped {
            reason: "mismatch".to_string(),
        };

        assert!(ArchivePolicy::AnyOutcome.allows(&skipped, &failed));
        assert!(ArchivePolicy::SuccessOnly.allows(&TableOutcome::Created, &loaded));
        assert!(!ArchivePolicy::SuccessOnly.allows(&skipped, &loaded));
        assert!(
            !ArchivePolicy::SuccessOnly.allows(
                &TableOutcome::AlreadyExists,
                &LoadOutcome::Failed {
                    error: "x".to_string()
                }
            )
        );
    }

    #[tokio::test]
    async fn test_archive_moves_file() {
        let storage = Arc::new(StorageProvider::in_memory("landing"));
        storage.put("raw_data/a.csv", "id\n1\n").await.unwrap();
        let file = FileRef::new("landing", "raw_data/a.csv").unwrap();

        let outcomes = archiver(storage.clone()).archive_files(&[&file]).await;

        assert_eq!(
            outcomes,
            vec![ArchiveOutcome::Archived {
                to: "archive/a.csv".to_string()
            }]
        );
        assert!(!storage.exists("raw_data/a.csv").await.unwrap());
        assert!(storage.exists("archive/a.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_failure_retains_original() {
        let storage = Arc::new(StorageProvider::in_memory("landing"));
        let file = FileRef::new("landing", "raw_data/gone.csv").unwrap();

        let outcomes = archiver(storage.clone()).archive_files(&[&file]).await;

        assert!(matches!(outcomes[0], ArchiveOutcome::Failed { .. }));
        assert!(!storage.exists("archive/gone.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_input_is_noop() {
        let storage = Arc::new(StorageProvider::in_memory("landing"));
        assert!(archiver(storage).archive_files(&[]).await.is_empty());
    }
}
