//! snowdrift-core: Shared plumbing for the snowdrift loader.
//!
//! - `storage/` - Object store access (S3, in-memory) scoped to one bucket
//! - `metrics/` - Internal metric events and the Prometheus endpoint
//! - `config/` - Environment variable interpolation and shared config types
//! - `signal` - Signal handling for graceful shutdown
//! - `tracing` - Subscriber initialization
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{InterpolationResult, MetricsConfig, interpolate};
pub use error::{ConfigError, MetricsError, StorageError};
pub use metrics::init_global as init_metrics;
pub use signal::shutdown_signal;
pub use storage::{S3Config, StorageProvider, StorageProviderRef};
pub use crate::tracing::{LogFormat, init_tracing};
