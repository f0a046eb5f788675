//! snowdrift: Batch loader from S3 into Snowflake.
//!
//! This crate handles:
//! - Discovering delimited files under an S3 prefix
//! - Provisioning the storage integration, database, schema, stage and file format
//! - Inferring a table per file from its header and the warehouse's type inference
//! - Loading each file with COPY INTO
//! - Running a downstream transformation job
//! - Archiving processed files
//! - Presigning uploads into the landing prefix and exporting loaded tables

pub mod archive;
pub mod config;
pub mod discovery;
pub mod error;
pub mod export;
pub mod load;
pub mod pipeline;
pub mod provision;
pub mod schema;
pub mod sql;
pub mod transform;
pub mod upload;
pub mod warehouse;

/// Re-export storage module from snowdrift-core for convenience
pub mod storage {
    pub use snowdrift_core::storage::*;
}

// Re-export commonly used items
pub use config::Config;
pub use discovery::FileRef;
pub use error::PipelineError;
pub use pipeline::{FileReport, Pipeline, RunReport};
pub use warehouse::{ResultSet, Warehouse, WarehouseRef};

pub use snowdrift_core::{
    LogFormat, MetricsConfig, StorageProvider, StorageProviderRef, init_metrics, init_tracing,
    shutdown_signal,
};
