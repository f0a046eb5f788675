//! Error types for the snowdrift pipeline.
//!
//! Fatal errors surface as [`PipelineError`] and stop the run. Per-file
//! errors ([`ReconcileError`], failed loads, [`ArchiveError`]) are logged and
//! recorded in the run report instead.

use snafu::prelude::*;

pub use snowdrift_core::error::{ConfigError, MetricsError, StorageError};

use crate::sql::InvalidDataType;

/// Errors from the warehouse SQL interface.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The HTTP client could not be built.
    #[snafu(display("Failed to build warehouse HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// The request could not be sent or the body could not be read.
    #[snafu(display("Warehouse request failed: {source}"))]
    Request { source: reqwest::Error },

    /// The response body was not the expected JSON.
    #[snafu(display("Failed to decode warehouse response: {source}"))]
    Decode { source: serde_json::Error },

    /// The warehouse rejected the statement.
    #[snafu(display("Statement failed ({code}, HTTP {status}): {message}"))]
    Statement {
        status: u16,
        code: String,
        message: String,
    },

    /// An asynchronous statement did not finish in time.
    #[snafu(display("Statement {handle} did not complete within {seconds}s"))]
    Timeout { handle: String, seconds: u64 },

    /// A 202 response did not say where to poll.
    #[snafu(display("Asynchronous statement response had no status URL"))]
    MissingStatusUrl,
}

/// Errors from provisioning warehouse objects. Always fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    /// Storage integration parameters are absent.
    #[snafu(display("Storage integration requires {}", missing.join(", ")))]
    MissingIntegrationParameter { missing: Vec<&'static str> },

    /// A provisioning statement failed.
    #[snafu(display("Failed to provision {object}: {source}"))]
    ProvisionStatement {
        object: &'static str,
        source: WarehouseError,
    },
}

/// Per-file failures while ensuring a table exists.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconcileError {
    /// The first line could not be read from the object store.
    #[snafu(display("Failed to read header of {key}: {source}"))]
    ReadHeader { key: String, source: StorageError },

    /// The first line is not a delimited record.
    #[snafu(display("Failed to parse header of {key}: {source}"))]
    ParseHeader { key: String, source: csv::Error },

    /// The first line is empty.
    #[snafu(display("No header found in {key}"))]
    EmptyHeader { key: String },

    /// The header cannot name table columns.
    #[snafu(display("Unusable header in {key}: {reason}"))]
    InvalidHeader { key: String, reason: String },

    /// The inference query failed.
    #[snafu(display("Schema inference failed for {key}: {source}"))]
    Inference { key: String, source: WarehouseError },

    /// The inference query returned rows we cannot interpret.
    #[snafu(display("Unexpected schema inference result for {key}: {reason}"))]
    InferenceResult { key: String, reason: String },

    /// Header and inference disagree on the number of columns.
    #[snafu(display(
        "Column count mismatch in {key}: header has {header}, inference returned {inferred}"
    ))]
    ColumnCountMismatch {
        key: String,
        header: usize,
        inferred: usize,
    },

    /// An inferred type cannot be written into DDL.
    #[snafu(display("Column '{column}' of {key}: {source}"))]
    InvalidType {
        key: String,
        column: String,
        source: InvalidDataType,
    },

    /// CREATE TABLE failed.
    #[snafu(display("Failed to create table {table}: {source}"))]
    CreateTable {
        table: String,
        source: WarehouseError,
    },
}

impl ReconcileError {
    /// Skips are expected data problems; everything else is a failure.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ReconcileError::EmptyHeader { .. }
                | ReconcileError::InvalidHeader { .. }
                | ReconcileError::ParseHeader { .. }
                | ReconcileError::ColumnCountMismatch { .. }
                | ReconcileError::InvalidType { .. }
        )
    }
}

/// Errors from the bulk-load step.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// The loader was handed an empty file list.
    #[snafu(display("No files to load: discovery returned nothing or its result was lost"))]
    NoFiles,

    /// COPY INTO failed for one file.
    #[snafu(display("COPY INTO {table} failed: {source}"))]
    Copy {
        table: String,
        source: WarehouseError,
    },
}

/// Errors from the downstream transformation job. Always fatal.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The job could not be started.
    #[snafu(display("Failed to start {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The job exited unsuccessfully.
    #[snafu(display("Transformation job exited with {status}"))]
    Exit { status: String },
}

/// Per-file failures while archiving.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArchiveError {
    /// Copy to the archive prefix failed; the source is untouched.
    #[snafu(display("Failed to copy {from} to {to}: {source}"))]
    ArchiveCopy {
        from: String,
        to: String,
        source: StorageError,
    },

    /// Delete after a successful copy failed; the object now exists twice.
    #[snafu(display("Archived {key} to {to} but failed to delete the original: {source}"))]
    ArchiveDelete {
        key: String,
        to: String,
        source: StorageError,
    },
}

/// Errors issuing a presigned upload URL.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UploadError {
    /// The requested file name cannot become a key under the active prefix.
    #[snafu(display("Invalid upload file name '{filename}': {reason}"))]
    InvalidFilename { filename: String, reason: String },

    #[snafu(display("Failed to presign upload of {key}: {source}"))]
    UploadUrl { key: String, source: StorageError },
}

/// Errors exporting warehouse tables.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExportError {
    #[snafu(display("Failed to list tables in {schema}: {source}"))]
    ListTables {
        schema: String,
        source: WarehouseError,
    },

    #[snafu(display("Failed to read table {table}: {source}"))]
    ExportTable {
        table: String,
        source: WarehouseError,
    },

    #[snafu(display("Failed to write {table} as CSV: {source}"))]
    ExportCsv { table: String, source: csv::Error },

    #[snafu(display("Failed to write archive entry {entry}: {source}"))]
    ExportEntry {
        entry: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to build zip archive: {source}"))]
    ExportZip { source: zip::result::ZipError },

    #[snafu(display("Failed to create {}: {source}", path.display()))]
    ExportFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// Top-level errors that stop a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Object store client could not be created.
    #[snafu(display("Storage setup failed: {source}"))]
    StorageSetup { source: StorageError },

    /// Warehouse client could not be created.
    #[snafu(display("Warehouse setup failed: {source}"))]
    WarehouseSetup { source: WarehouseError },

    /// Listing the active prefix failed.
    #[snafu(display("File discovery failed: {source}"))]
    Discovery { source: StorageError },

    /// Provisioning failed.
    #[snafu(display("{source}"))]
    Provision { source: ProvisionError },

    /// Loading failed as a whole.
    #[snafu(display("Load failed: {source}"))]
    Load { source: LoadError },

    /// Transformation job failed.
    #[snafu(display("{source}"))]
    Transform { source: TransformError },

    /// Presigning an upload URL failed.
    #[snafu(display("{source}"))]
    Upload { source: UploadError },

    /// Exporting warehouse tables failed.
    #[snafu(display("Export failed: {source}"))]
    Export { source: ExportError },

    /// Metrics could not be initialized.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}
