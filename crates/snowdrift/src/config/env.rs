//! Building a [`Config`] from flat environment variables.

use std::collections::HashMap;

use super::{
    ArchiveConfig, ArchivePolicy, Config, DiscoveryConfig, FormatConfig, IntegrationConfig,
    MetricsConfig, ObjectsConfig, ScheduleConfig, StorageConfig, TransformConfig, TokenType,
    WarehouseConfig, default_docker, default_file_format, default_integration,
    default_poll_interval, default_request_timeout, default_statement_timeout,
    default_table_prefix, default_transform_command,
};
use crate::error::ConfigError;

const REQUIRED_KEYS: &[&str] = &[
    "BUCKET_NAME",
    "PREFIX",
    "ARCHIVE_PREFIX",
    "STAGE_NAME",
    "SUPPORTED_EXTENSIONS",
    "DELIMITER",
    "SNOWFLAKE_DATABASE",
    "SNOWFLAKE_SCHEMA",
    "AWS_ROLE_ARN",
    "AWS_EXTERNAL_ID",
    "AWS_ALLOWED_LOCATIONS",
    "SNOWFLAKE_ACCOUNT",
    "SNOWFLAKE_TOKEN",
];

/// Comma-separated list, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Storage locations may be given bare (`s3://a/,s3://b/`) or in the SQL
/// list form the integration statement uses (`('s3://a/','s3://b/')`).
fn parse_locations(value: &str) -> Vec<String> {
    let value = value.trim();
    let value = value
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(value);
    split_list(value)
        .into_iter()
        .map(|item| {
            item.trim_matches(|c| c == '\'' || c == '"')
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// A delimiter is one character, or one of the spellings `\t` / `tab`.
fn parse_delimiter(value: &str) -> Result<char, String> {
    if matches!(value, "\\t" | "tab" | "TAB") {
        return Ok('\t');
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("DELIMITER '{value}' must be a single character")),
    }
}

impl Config {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from environment-style keys resolved through
    /// `lookup`. Missing required keys are reported together; so are
    /// invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut values = HashMap::new();
        let mut missing = Vec::new();
        for key in REQUIRED_KEYS {
            match optional(key) {
                Some(value) => {
                    values.insert(*key, value);
                }
                None => missing.push(key.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys { keys: missing });
        }
        let required = |key: &str| values.get(key).cloned().unwrap_or_default();

        let mut errors = Vec::new();

        let delimiter = parse_delimiter(&required("DELIMITER")).unwrap_or_else(|e| {
            errors.push(e);
            ','
        });

        let token_type = match optional("SNOWFLAKE_TOKEN_TYPE") {
            Some(value) => value.parse::<TokenType>().unwrap_or_else(|e| {
                errors.push(e);
                TokenType::default()
            }),
            None => TokenType::default(),
        };

        let policy = match optional("ARCHIVE_POLICY") {
            Some(value) => value.parse::<ArchivePolicy>().unwrap_or_else(|e| {
                errors.push(e);
                ArchivePolicy::default()
            }),
            None => ArchivePolicy::default(),
        };

        let transform = optional("TRANSFORM_IMAGE").map(|image| TransformConfig {
            image,
            command: optional("TRANSFORM_COMMAND")
                .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(default_transform_command),
            network: optional("TRANSFORM_NETWORK"),
            workdir: optional("TRANSFORM_WORKDIR"),
            env: Vec::new(),
            docker: default_docker(),
        });

        let mut config = Config {
            storage: StorageConfig {
                bucket: required("BUCKET_NAME"),
                prefix: required("PREFIX"),
                archive_prefix: required("ARCHIVE_PREFIX"),
                region: optional("AWS_REGION"),
                endpoint: optional("S3_ENDPOINT"),
                options: HashMap::new(),
            },
            discovery: DiscoveryConfig {
                extensions: split_list(&required("SUPPORTED_EXTENSIONS")),
            },
            warehouse: WarehouseConfig {
                account: required("SNOWFLAKE_ACCOUNT"),
                database: required("SNOWFLAKE_DATABASE"),
                schema: required("SNOWFLAKE_SCHEMA"),
                token: required("SNOWFLAKE_TOKEN"),
                token_type,
                warehouse: optional("SNOWFLAKE_WAREHOUSE"),
                role: optional("SNOWFLAKE_ROLE"),
                url: optional("SNOWFLAKE_URL"),
                statement_timeout_secs: default_statement_timeout(),
                request_timeout_secs: default_request_timeout(),
                poll_interval_ms: default_poll_interval(),
            },
            objects: ObjectsConfig {
                integration: optional("INTEGRATION_NAME").unwrap_or_else(default_integration),
                stage: required("STAGE_NAME"),
                file_format: optional("FILE_FORMAT_NAME").unwrap_or_else(default_file_format),
                table_prefix: lookup("TABLE_PREFIX").unwrap_or_else(default_table_prefix),
            },
            format: FormatConfig {
                delimiter,
                ..FormatConfig::default()
            },
            integration: IntegrationConfig {
                role_arn: required("AWS_ROLE_ARN"),
                external_id: required("AWS_EXTERNAL_ID"),
                allowed_locations: parse_locations(&required("AWS_ALLOWED_LOCATIONS")),
            },
            transform,
            archive: ArchiveConfig { policy },
            schedule: optional("SCHEDULE_AT")
                .map(|daily_at| ScheduleConfig { daily_at })
                .unwrap_or_default(),
            metrics: MetricsConfig {
                address: optional("METRICS_ADDRESS"),
            },
        };

        config.normalize();
        if let Err(ConfigError::Invalid { errors: more }) = config.validate() {
            errors.extend(more);
        }
        if !errors.is_empty() {
            return Err(ConfigError::Invalid { errors });
        }
        Ok(config)
    }
}
