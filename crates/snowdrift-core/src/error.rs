//! Common error types shared across snowdrift crates.
//!
//! Storage, configuration and metrics failures live here so that the
//! pipeline crate can wrap them with its own context.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Object store operation failed.
    #[snafu(display("Storage operation failed on {key}: {source}"))]
    ObjectStore {
        key: String,
        source: object_store::Error,
    },

    /// Listing objects under a prefix failed.
    #[snafu(display("Failed to list objects under '{prefix}': {source}"))]
    List {
        prefix: String,
        source: object_store::Error,
    },

    /// S3 client configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// The store has no way to sign URLs (e.g. the in-memory store).
    #[snafu(display("Storage for bucket {bucket} cannot sign URLs"))]
    SigningUnsupported { bucket: String },

    /// Signing a URL failed.
    #[snafu(display("Failed to sign URL for {key}: {source}"))]
    Sign {
        key: String,
        source: object_store::Error,
    },

    /// The first line of an object exceeded the read limit.
    #[snafu(display("First line of {key} exceeds {limit} bytes"))]
    LineTooLong { key: String, limit: usize },

    /// The first line of an object is not valid UTF-8.
    #[snafu(display("First line of {key} is not valid UTF-8"))]
    InvalidUtf8 {
        key: String,
        source: std::string::FromUtf8Error,
    },
}

// ============ Config Errors ============

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Required environment keys are not set.
    #[snafu(display("Missing required environment variables: {}", keys.join(", ")))]
    MissingKeys { keys: Vec<String> },

    /// One or more configuration values are invalid.
    #[snafu(display("Invalid configuration:\n  {}", errors.join("\n  ")))]
    Invalid { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder: {source}"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics address could not be parsed.
    #[snafu(display("Failed to parse metrics address '{address}': {source}"))]
    AddressParse {
        address: String,
        source: std::net::AddrParseError,
    },
}
