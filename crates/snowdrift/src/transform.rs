//! Downstream transformation job, run after loading and before archival.

use async_trait::async_trait;
use snafu::prelude::*;
use std::time::Instant;
use tokio::process::Command;
use tracing::info;

use crate::config::TransformConfig;
use crate::error::{ExitSnafu, SpawnSnafu, TransformError};

/// A job that runs to completion over the freshly loaded tables.
#[async_trait]
pub trait TransformJob: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    async fn run(&self) -> Result<(), TransformError>;
}

/// Runs the transformation in a throwaway container.
#[derive(Debug, Clone)]
pub struct DockerTransform {
    config: TransformConfig,
}

impl DockerTransform {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the container runtime.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if let Some(network) = &self.config.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        if let Some(workdir) = &self.config.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        for name in &self.config.env {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args.push(self.config.image.clone());
        args.extend(self.config.command.iter().cloned());
        args
    }
}

#[async_trait]
impl TransformJob for DockerTransform {
    fn describe(&self) -> String {
        format!("{} ({})", self.config.image, self.config.command.join(" "))
    }

    async fn run(&self) -> Result<(), TransformError> {
        let program = &self.config.docker;
        info!(image = %self.config.image, command = ?self.config.command, "Starting transformation job");

        let start = Instant::now();
        let status = Command::new(program)
            .args(self.args())
            .kill_on_drop(true)
            .status()
            .await
            .context(SpawnSnafu { program })?;

        ensure!(
            status.success(),
            ExitSnafu {
                status: status.to_string(),
            }
        );

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Transformation job finished"
        );
        Ok(())
    }
}
