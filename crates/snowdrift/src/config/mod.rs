//! Configuration for the snowdrift loader.
//!
//! A [`Config`] is built once at startup, either from a YAML file with
//! `${VAR}` interpolation or from plain environment variables (see
//! [`Config::from_env`]), and validated eagerly. Every problem found is
//! reported together in a single [`ConfigError`].

mod env;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::sql::Namespace;
pub use snowdrift_core::config::MetricsConfig;
use snowdrift_core::config::interpolate;
use snowdrift_core::error::{EnvInterpolationSnafu, InvalidSnafu, ReadFileSnafu, YamlParseSnafu};
use snowdrift_core::storage::S3Config;

/// Bytes read from the start of an object when looking for its header.
pub const HEADER_READ_LIMIT: usize = 1024 * 1024;

/// Object store location of incoming and archived files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Bucket holding both the active and archive prefixes.
    pub bucket: String,
    /// Prefix scanned for new files (e.g. "raw_data").
    pub prefix: String,
    /// Prefix processed files are moved under.
    pub archive_prefix: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Extra `object_store` S3 options (credentials, etc.).
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    pub fn s3_config(&self) -> S3Config {
        S3Config {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            options: self.options.clone(),
        }
    }

    /// External URL the stage points at: `s3://<bucket>/<prefix>/`.
    pub fn stage_url(&self) -> String {
        format!("s3://{}/{}/", self.bucket, self.prefix)
    }
}

/// Which files discovery picks up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Allowed extensions, compared case-insensitively (e.g. `csv`, `.tsv`).
    pub extensions: Vec<String>,
}

/// How the warehouse SQL API authenticates a bearer token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    #[default]
    Oauth,
    KeypairJwt,
    ProgrammaticAccessToken,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Oauth => "OAUTH",
            TokenType::KeypairJwt => "KEYPAIR_JWT",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OAUTH" => Ok(TokenType::Oauth),
            "KEYPAIR_JWT" => Ok(TokenType::KeypairJwt),
            "PROGRAMMATIC_ACCESS_TOKEN" => Ok(TokenType::ProgrammaticAccessToken),
            other => Err(format!(
                "unknown token type '{other}' (expected OAUTH, KEYPAIR_JWT or PROGRAMMATIC_ACCESS_TOKEN)"
            )),
        }
    }
}

/// Snowflake connection and target namespace.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    /// Account identifier (e.g. "myorg-myaccount").
    pub account: String,
    pub database: String,
    pub schema: String,
    /// Bearer token for the SQL API.
    pub token: String,
    #[serde(default)]
    pub token_type: TokenType,
    /// Virtual warehouse to run statements on.
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Override for the API base URL. Defaults to
    /// `https://<account>.snowflakecomputing.com`.
    #[serde(default)]
    pub url: Option<String>,
    /// Server-side statement timeout, also the client polling deadline.
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
    /// Timeout for a single HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Delay between polls of an asynchronous statement.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_statement_timeout() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    500
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl WarehouseConfig {
    pub fn base_url(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.schema)
    }
}

/// Names of the long-lived warehouse objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectsConfig {
    #[serde(default = "default_integration")]
    pub integration: String,
    pub stage: String,
    #[serde(default = "default_file_format")]
    pub file_format: String,
    /// Prepended to the lower-cased file stem to name each table.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

fn default_integration() -> String {
    "my_s3_integration".to_string()
}

fn default_file_format() -> String {
    "my_csv_format".to_string()
}

fn default_table_prefix() -> String {
    "raw_".to_string()
}

/// Parsing options for the delimited files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    pub delimiter: char,
    #[serde(default = "default_quote")]
    pub quote: char,
    #[serde(default = "default_skip_header")]
    pub skip_header: u32,
}

fn default_quote() -> char {
    '"'
}

fn default_skip_header() -> u32 {
    1
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: default_quote(),
            skip_header: default_skip_header(),
        }
    }
}

/// Parameters of the storage integration. Left empty here, they fail
/// provisioning rather than config loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub role_arn: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub allowed_locations: Vec<String>,
}

/// Containerised transformation job run after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    pub image: String,
    #[serde(default = "default_transform_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    /// Environment variable names passed through to the container.
    #[serde(default)]
    pub env: Vec<String>,
    /// Container runtime binary.
    #[serde(default = "default_docker")]
    pub docker: String,
}

fn default_transform_command() -> Vec<String> {
    vec!["dbt".to_string(), "run".to_string()]
}

fn default_docker() -> String {
    "docker".to_string()
}

/// Which files the archiver moves after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePolicy {
    /// Archive every processed file regardless of outcome.
    #[default]
    AnyOutcome,
    /// Archive only files whose table and load steps succeeded.
    SuccessOnly,
}

impl FromStr for ArchivePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any_outcome" => Ok(ArchivePolicy::AnyOutcome),
            "success_only" => Ok(ArchivePolicy::SuccessOnly),
            other => Err(format!(
                "unknown archive policy '{other}' (expected any_outcome or success_only)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub policy: ArchivePolicy,
}

/// Daily schedule for `--daily` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Time of day in UTC, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
}

fn default_daily_at() -> String {
    "18:49".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
        }
    }
}

impl ScheduleConfig {
    pub fn time(&self) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(self.daily_at.trim(), "%H:%M")
            .map_err(|e| format!("schedule.daily_at '{}' is not HH:MM: {e}", self.daily_at))
    }
}

/// Main configuration for snowdrift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub discovery: DiscoveryConfig,
    pub warehouse: WarehouseConfig,
    pub objects: ObjectsConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub integration: IntegrationConfig,
    /// Without a transform section the transformation step is skipped.
    #[serde(default)]
    pub transform: Option<TransformConfig>,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, interpolating the process
    /// environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_with(contents, |name| std::env::var(name).ok())
    }

    /// Parse configuration from YAML, resolving `${VAR}` through `lookup`.
    pub fn parse_with<F>(contents: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let result = interpolate(contents, lookup);
        ensure!(
            result.is_ok(),
            EnvInterpolationSnafu {
                message: result.errors.join("\n"),
            }
        );

        let mut config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trim slashes from prefixes and reduce extensions to lower case without
    /// a leading dot.
    pub fn normalize(&mut self) {
        self.storage.prefix = trim_slashes(&self.storage.prefix);
        self.storage.archive_prefix = trim_slashes(&self.storage.archive_prefix);
        self.discovery.extensions = self
            .discovery
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self.discovery.extensions.sort();
        self.discovery.extensions.dedup();
        self.integration.allowed_locations = self
            .integration
            .allowed_locations
            .iter()
            .map(|loc| loc.trim().to_string())
            .filter(|loc| !loc.is_empty())
            .collect();
    }

    /// Validate the configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let required = [
            ("storage.bucket", &self.storage.bucket),
            ("storage.prefix", &self.storage.prefix),
            ("storage.archive_prefix", &self.storage.archive_prefix),
            ("warehouse.account", &self.warehouse.account),
            ("warehouse.database", &self.warehouse.database),
            ("warehouse.schema", &self.warehouse.schema),
            ("warehouse.token", &self.warehouse.token),
            ("objects.integration", &self.objects.integration),
            ("objects.stage", &self.objects.stage),
            ("objects.file_format", &self.objects.file_format),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }

        let (prefix, archive) = (&self.storage.prefix, &self.storage.archive_prefix);
        if !prefix.is_empty() && !archive.is_empty() && prefixes_overlap(prefix, archive) {
            errors.push(format!(
                "storage.prefix '{prefix}' and storage.archive_prefix '{archive}' must not contain each other"
            ));
        }

        if self.discovery.extensions.is_empty() {
            errors.push("discovery.extensions must list at least one extension".to_string());
        } else if self.discovery.extensions.iter().any(|ext| ext.is_empty()) {
            errors.push("discovery.extensions must not contain empty entries".to_string());
        }

        let (delimiter, quote) = (self.format.delimiter, self.format.quote);
        if !delimiter.is_ascii() || matches!(delimiter, '\n' | '\r') {
            errors.push(format!("format.delimiter {delimiter:?} must be a single ASCII character"));
        }
        if !quote.is_ascii() || matches!(quote, '\n' | '\r') {
            errors.push(format!("format.quote {quote:?} must be a single ASCII character"));
        }
        if delimiter == quote {
            errors.push("format.delimiter and format.quote must differ".to_string());
        }

        if self.warehouse.statement_timeout_secs == 0 {
            errors.push("warehouse.statement_timeout_secs must be positive".to_string());
        }

        if let Some(transform) = &self.transform {
            if transform.image.trim().is_empty() {
                errors.push("transform.image must not be empty".to_string());
            }
            if transform.command.is_empty() {
                errors.push("transform.command must not be empty".to_string());
            }
        }

        if let Err(e) = self.schedule.time() {
            errors.push(e);
        }

        ensure!(errors.is_empty(), InvalidSnafu { errors });
        Ok(())
    }
}

fn trim_slashes(value: &str) -> String {
    value.trim().trim_matches('/').to_string()
}

/// True when either prefix is the other or lies beneath it.
fn prefixes_overlap(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| inner == outer || inner.starts_with(&format!("{outer}/"));
    nested(a, b) || nested(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
storage:
  bucket: landing
  prefix: /raw_data/
  archive_prefix: archive
discovery:
  extensions: [".CSV", "txt"]
warehouse:
  account: myorg-acct
  database: ANALYTICS
  schema: RAW
  token: ${SNOWFLAKE_TOKEN}
  warehouse: LOAD_WH
objects:
  stage: landing_stage
format:
  delimiter: ","
integration:
  role_arn: arn:aws:iam::123456789012:role/loader
  external_id: ext-1
  allowed_locations: ["s3://landing/raw_data/"]
transform:
  image: dbt-project-image:latest
  network: etl_angular
  workdir: /dbt
"#;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SNOWFLAKE_TOKEN" => Some("secret".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_yaml() {
        let config = Config::parse_with(YAML, lookup).unwrap();

        assert_eq!(config.storage.prefix, "raw_data");
        assert_eq!(config.storage.stage_url(), "s3://landing/raw_data/");
        assert_eq!(config.discovery.extensions, vec!["csv", "txt"]);
        assert_eq!(config.warehouse.token, "secret");
        assert_eq!(config.warehouse.token_type, TokenType::Oauth);
        assert_eq!(config.warehouse.base_url(), "https://myorg-acct.snowflakecomputing.com");
        assert_eq!(config.objects.integration, "my_s3_integration");
        assert_eq!(config.objects.file_format, "my_csv_format");
        assert_eq!(config.objects.table_prefix, "raw_");
        assert_eq!(config.format.quote, '"');
        assert_eq!(config.format.skip_header, 1);
        assert_eq!(config.archive.policy, ArchivePolicy::AnyOutcome);
        assert_eq!(config.schedule.daily_at, "18:49");

        let transform = config.transform.unwrap();
        assert_eq!(transform.command, vec!["dbt", "run"]);
        assert_eq!(transform.docker, "docker");
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let err = Config::parse_with(YAML, |_| None).unwrap_err();
        match err {
            ConfigError::EnvInterpolation { message } => {
                assert!(message.contains("SNOWFLAKE_TOKEN"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_errors_are_aggregated() {
        let mut config = Config::parse_with(YAML, lookup).unwrap();
        config.storage.archive_prefix = "raw_data/done".to_string();
        config.discovery.extensions.clear();
        config.format.quote = ',';
        config.schedule.daily_at = "25:00".to_string();

        match config.validate().unwrap_err() {
            ConfigError::Invalid { errors } => {
                assert_eq!(errors.len(), 4, "{errors:?}");
                assert!(errors[0].contains("must not contain each other"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prefixes_overlap() {
        assert!(prefixes_overlap("raw", "raw"));
        assert!(prefixes_overlap("raw", "raw/archive"));
        assert!(prefixes_overlap("raw/archive", "raw"));
        assert!(!prefixes_overlap("raw", "raw_archive"));
        assert!(!prefixes_overlap("raw_data", "archive"));
    }

    #[test]
    fn test_token_is_redacted() {
        let config = Config::parse_with(YAML, lookup).unwrap();
        let debug = format!("{:?}", config.warehouse);
        assert!(!debug.contains("secret"));
    }
}
