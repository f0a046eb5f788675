//! snowdrift: Load delimited files from S3 into Snowflake.
//!
//! Discovers files under an S3 prefix, provisions the warehouse objects
//! needed to read them, creates one table per file from inferred schemas,
//! loads each file with COPY INTO, runs a transformation job and archives
//! what was processed.
//!
//! Two helper commands sit beside the pipeline: `upload-url` presigns a PUT
//! into the landing prefix and `export` zips every table in the target schema.

use clap::{Parser, Subcommand};
use snafu::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use snowdrift::config::Config;
use snowdrift::error::{
    ConfigError, ConfigSnafu, ExportSnafu, MetricsSnafu, PipelineError, ProvisionSnafu,
    StorageSetupSnafu, UploadSnafu, WarehouseSetupSnafu,
};
use snowdrift::export::{DEFAULT_ARCHIVE, Exporter};
use snowdrift::pipeline::{Pipeline, run_daily};
use snowdrift::upload::{DEFAULT_EXPIRY, Uploads};
use snowdrift::warehouse::SnowflakeClient;
use snowdrift::{LogFormat, StorageProvider, init_metrics, init_tracing, shutdown_signal};

/// S3 to Snowflake batch loader.
#[derive(Parser, Debug)]
#[command(name = "snowdrift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file. Without it, configuration is read
    /// from environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format (text or json).
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Dry run - validate configuration and print the provisioning plan.
    #[arg(long)]
    dry_run: bool,

    /// Keep running and start a run once a day at `schedule.daily_at`.
    #[arg(long)]
    daily: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a presigned URL that uploads one file into the landing prefix.
    UploadUrl {
        /// File name, relative to the landing prefix.
        filename: String,

        /// Seconds the URL stays valid.
        #[arg(long, default_value_t = DEFAULT_EXPIRY.as_secs())]
        expires_secs: u64,
    },
    /// Export every table in the target schema as CSV files inside a zip.
    Export {
        /// Archive to write.
        #[arg(short, long, default_value = DEFAULT_ARCHIVE)]
        output: PathBuf,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    init_tracing(&args.log_level, args.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "snowdrift starting");

    let config = build_config(&args)?;

    match &args.command {
        Some(Command::UploadUrl {
            filename,
            expires_secs,
        }) => return upload_url(&config, filename, Duration::from_secs(*expires_secs)).await,
        Some(Command::Export { output }) => return export(&config, output).await,
        None => {}
    }

    let pipeline = Pipeline::from_config(&config)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Bucket: {}", config.storage.bucket);
        info!("Prefix: {}", config.storage.prefix);
        info!("Archive prefix: {}", config.storage.archive_prefix);
        info!("Extensions: {}", config.discovery.extensions.join(", "));
        info!(
            "Target: {}",
            config.warehouse.namespace().schema_name()
        );
        info!("Archive policy: {:?}", config.archive.policy);
        for (object, statement) in pipeline.provisioner().plan().context(ProvisionSnafu)? {
            info!("Provision {object}:\n{statement}");
        }
        info!("Configuration is valid");
        return Ok(());
    }

    if let Some(address) = &config.metrics.address {
        init_metrics(address).context(MetricsSnafu)?;
        debug!("Metrics endpoint listening on http://{address}/metrics");
    }

    if args.daily {
        let at = config
            .schedule
            .time()
            .map_err(|e| ConfigError::Invalid { errors: vec![e] })
            .context(ConfigSnafu)?;

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_token.cancel();
        });

        info!(daily_at = %config.schedule.daily_at, "Running daily (UTC)");
        let pipeline = &pipeline;
        run_daily(at, shutdown, move |_| pipeline.run()).await;
        info!("snowdrift stopped");
        return Ok(());
    }

    let report = pipeline.run().await?;
    report.log_summary();

    Ok(())
}

async fn upload_url(config: &Config, filename: &str, expires_in: Duration) -> Result<(), PipelineError> {
    let storage = StorageProvider::s3(&config.storage.s3_config()).context(StorageSetupSnafu)?;
    let upload = Uploads::new(Arc::new(storage), config)
        .upload_url(filename, expires_in)
        .await
        .context(UploadSnafu)?;

    println!("{}", upload.url);
    Ok(())
}

async fn export(config: &Config, output: &std::path::Path) -> Result<(), PipelineError> {
    let warehouse = SnowflakeClient::new(&config.warehouse).context(WarehouseSetupSnafu)?;
    Exporter::new(Arc::new(warehouse), config)
        .export_to(output)
        .await
        .context(ExportSnafu)?;
    Ok(())
}

/// Build configuration from a file if given, else from the environment.
fn build_config(args: &Args) -> Result<Config, PipelineError> {
    match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            Config::from_file(path)
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()
        }
    }
    .context(ConfigSnafu)
}
