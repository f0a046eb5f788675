//! Internal events for snowdrift metrics emission.
//!
//! Each event struct represents a measurable occurrence in a pipeline run.
//! Events implement `InternalEvent`, which records the Prometheus metric.
//! Without an installed recorder the `metrics` macros are no-ops, so events
//! can be emitted unconditionally.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when files are discovered under the active prefix.
pub struct FilesDiscovered {
    pub count: u64,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(count = self.count, "Files discovered");
        counter!("snowdrift_files_discovered_total").increment(self.count);
    }
}

/// Pipeline step a per-file outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStep {
    Table,
    Load,
    Archive,
}

impl FileStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStep::Table => "table",
            FileStep::Load => "load",
            FileStep::Archive => "archive",
        }
    }
}

/// Outcome of one step for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Success,
    Skipped,
    Failed,
}

impl FileStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        }
    }
}

/// Event emitted once per file per step.
pub struct FileProcessed {
    pub step: FileStep,
    pub status: FileStatus,
}

impl InternalEvent for FileProcessed {
    fn emit(self) {
        trace!(
            step = self.step.as_str(),
            status = self.status.as_str(),
            "File processed"
        );
        counter!(
            "snowdrift_files_processed_total",
            "step" => self.step.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a COPY INTO reports loaded rows.
pub struct RowsLoaded {
    pub rows: u64,
    pub errors: u64,
    pub table: String,
}

impl InternalEvent for RowsLoaded {
    fn emit(self) {
        trace!(rows = self.rows, errors = self.errors, table = %self.table, "Rows loaded");
        counter!("snowdrift_rows_loaded_total", "table" => self.table.clone()).increment(self.rows);
        counter!("snowdrift_rows_rejected_total", "table" => self.table).increment(self.errors);
    }
}

/// Event emitted when a pipeline stage finishes.
pub struct StageCompleted {
    pub stage: &'static str,
    pub duration: Duration,
    pub success: bool,
}

impl InternalEvent for StageCompleted {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(
            stage = self.stage,
            status,
            duration_ms = self.duration.as_millis(),
            "Stage completed"
        );
        counter!("snowdrift_stages_total", "stage" => self.stage, "status" => status).increment(1);
        histogram!("snowdrift_stage_duration_seconds", "stage" => self.stage)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a whole run finishes.
pub struct RunCompleted {
    pub duration: Duration,
    pub success: bool,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(status, duration_ms = self.duration.as_millis(), "Run completed");
        counter!("snowdrift_runs_total", "status" => status).increment(1);
        histogram!("snowdrift_run_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a warehouse statement completes.
pub struct WarehouseStatement {
    pub success: bool,
    pub duration: Duration,
}

impl InternalEvent for WarehouseStatement {
    fn emit(self) {
        let status = if self.success { "success" } else { "error" };
        trace!(status, duration_ms = self.duration.as_millis(), "Warehouse statement");
        counter!("snowdrift_warehouse_statements_total", "status" => status).increment(1);
        histogram!("snowdrift_warehouse_statement_duration_seconds")
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Storage request events
// ============================================================================

/// Type of storage operation.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    Copy,
    Delete,
    List,
    Sign,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Copy => "copy",
            StorageOperation::Delete => "delete",
            StorageOperation::List => "list",
            StorageOperation::Sign => "sign",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    pub fn from_ok(ok: bool) -> Self {
        if ok {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request"
        );
        counter!(
            "snowdrift_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!(
            "snowdrift_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
