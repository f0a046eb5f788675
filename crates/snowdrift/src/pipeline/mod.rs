//! Pipeline controller.
//!
//! A run is a fixed chain of stages over one discovered file list:
//!
//! discovery → provisioning (integration, database/schema, stage, file
//! format) → table reconciliation → load → transformation → archival.
//!
//! Stages and files are processed strictly in order. Per-file problems are
//! recorded in the [`RunReport`]; any stage-level failure stops the run.

mod report;
mod schedule;

pub use report::{FileReport, RunReport};
pub use schedule::{next_run, run_daily};

use chrono::Utc;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::{RunCompleted, StageCompleted};
use snowdrift_core::{StorageProvider, StorageProviderRef};

use crate::archive::{ArchiveOutcome, Archiver};
use crate::config::Config;
use crate::discovery::{FileRef, discover_files};
use crate::error::{
    DiscoverySnafu, LoadSnafu, PipelineError, ProvisionSnafu, StorageSetupSnafu, TransformSnafu,
    WarehouseSetupSnafu,
};
use crate::load::Loader;
use crate::provision::Provisioner;
use crate::schema::{Reconciler, table_name};
use crate::transform::{DockerTransform, TransformJob};
use crate::warehouse::{SnowflakeClient, WarehouseRef};

/// Logs a stage's start and finish and records its duration.
struct StageTimer {
    stage: &'static str,
    start: Instant,
}

impl StageTimer {
    fn start(stage: &'static str) -> Self {
        info!(stage, "Stage started");
        Self {
            stage,
            start: Instant::now(),
        }
    }

    fn finish(self, success: bool) {
        let duration = self.start.elapsed();
        emit!(StageCompleted {
            stage: self.stage,
            duration,
            success,
        });
        if success {
            info!(
                stage = self.stage,
                duration_ms = duration.as_millis() as u64,
                "Stage finished"
            );
        } else {
            error!(
                stage = self.stage,
                duration_ms = duration.as_millis() as u64,
                "Stage failed"
            );
        }
    }
}

/// Run a fallible stage under a timer.
async fn timed<T, E>(
    stage: &'static str,
    fut: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let timer = StageTimer::start(stage);
    let result = fut.await;
    timer.finish(result.is_ok());
    result
}

/// One configured pipeline: every stage wired to the same storage and
/// warehouse.
pub struct Pipeline {
    storage: StorageProviderRef,
    prefix: String,
    extensions: Vec<String>,
    table_prefix: String,
    provisioner: Provisioner,
    reconciler: Reconciler,
    loader: Loader,
    transform: Option<Arc<dyn TransformJob>>,
    archiver: Archiver,
}

impl Pipeline {
    /// Wire a pipeline from explicit dependencies.
    pub fn new(
        config: &Config,
        storage: StorageProviderRef,
        warehouse: WarehouseRef,
        transform: Option<Arc<dyn TransformJob>>,
    ) -> Self {
        Self {
            prefix: config.storage.prefix.clone(),
            extensions: config.discovery.extensions.clone(),
            table_prefix: config.objects.table_prefix.clone(),
            provisioner: Provisioner::new(warehouse.clone(), config),
            reconciler: Reconciler::new(warehouse.clone(), storage.clone(), config),
            loader: Loader::new(warehouse, config),
            transform,
            archiver: Archiver::new(storage.clone(), config),
            storage,
        }
    }

    /// Build S3 storage, the Snowflake client and the transformation job
    /// from configuration.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let storage = Arc::new(
            StorageProvider::s3(&config.storage.s3_config()).context(StorageSetupSnafu)?,
        );
        let warehouse: WarehouseRef =
            Arc::new(SnowflakeClient::new(&config.warehouse).context(WarehouseSetupSnafu)?);
        let transform = config
            .transform
            .clone()
            .map(|t| Arc::new(DockerTransform::new(t)) as Arc<dyn TransformJob>);

        info!(
            storage = storage.url(),
            warehouse = %config.warehouse.base_url(),
            "Pipeline configured"
        );
        Ok(Self::new(config, storage, warehouse, transform))
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Execute one run.
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let result = self.execute().await;

        emit!(RunCompleted {
            duration: start.elapsed(),
            success: result.is_ok(),
        });
        if let Err(e) = &result {
            error!(error = %e, "Run failed");
        }
        result
    }

    async fn execute(&self) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        info!(storage = self.storage.url(), prefix = %self.prefix, "Run started");

        let files = timed(
            "discovery",
            discover_files(&self.storage, &self.prefix, &self.extensions),
        )
        .await
        .context(DiscoverySnafu)?;

        self.provision().await?;

        let timer = StageTimer::start("tables");
        let tables = self.reconciler.ensure_tables(&files).await;
        timer.finish(true);

        let loads = timed("load", self.loader.load_all(&files))
            .await
            .context(LoadSnafu)?;

        if let Some(job) = &self.transform {
            info!(job = %job.describe(), "Running transformation");
            timed("transform", job.run()).await.context(TransformSnafu)?;
        } else {
            info!("No transformation job configured");
        }

        let timer = StageTimer::start("archive");
        let policy = self.archiver.policy();
        let eligible: Vec<bool> = tables
            .iter()
            .zip(&loads)
            .map(|(table, load)| policy.allows(table, load))
            .collect();
        let to_archive: Vec<&FileRef> = files
            .iter()
            .zip(&eligible)
            .filter(|(_, eligible)| **eligible)
            .map(|(file, _)| file)
            .collect();
        let mut archived = self.archiver.archive_files(&to_archive).await.into_iter();
        timer.finish(true);

        let reports = files
            .into_iter()
            .zip(tables)
            .zip(loads)
            .zip(eligible)
            .map(|(((file, table), load), eligible)| {
                let archive = if eligible {
                    archived.next().unwrap_or(ArchiveOutcome::Retained)
                } else {
                    info!(file = %file.key, "Retained by archive policy");
                    ArchiveOutcome::Retained
                };
                FileReport {
                    table_name: table_name(&self.table_prefix, &file),
                    file,
                    table,
                    load,
                    archive,
                }
            })
            .collect();

        Ok(RunReport {
            files: reports,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn provision(&self) -> Result<(), PipelineError> {
        let p = &self.provisioner;
        timed("storage_integration", p.create_storage_integration())
            .await
            .context(ProvisionSnafu)?;
        timed("database_schema", p.create_database_and_schema())
            .await
            .context(ProvisionSnafu)?;
        timed("stage", p.create_stage())
            .await
            .context(ProvisionSnafu)?;
        timed("file_format", p.create_file_format())
            .await
            .context(ProvisionSnafu)?;
        Ok(())
    }
}
