//! Provisioning of the long-lived warehouse objects.
//!
//! Each step is idempotent (`IF NOT EXISTS` or `OR REPLACE`) so provisioning
//! runs in full at the start of every pipeline run.

use snafu::prelude::*;
use tracing::info;

use crate::config::{Config, FormatConfig, IntegrationConfig};
use crate::error::{MissingIntegrationParameterSnafu, ProvisionError, ProvisionStatementSnafu};
use crate::sql::{self, Namespace};
use crate::warehouse::WarehouseRef;

/// Resolved names of the warehouse objects a run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNames {
    pub namespace: Namespace,
    /// Account-level, unqualified.
    pub integration: String,
    /// Qualified stage name.
    pub stage: String,
    /// Qualified file format name.
    pub file_format: String,
    pub table_prefix: String,
}

impl ObjectNames {
    pub fn from_config(config: &Config) -> Self {
        let namespace = config.warehouse.namespace();
        Self {
            integration: config.objects.integration.clone(),
            stage: namespace.object(&config.objects.stage),
            file_format: namespace.object(&config.objects.file_format),
            table_prefix: config.objects.table_prefix.clone(),
            namespace,
        }
    }

    /// Qualified name of a table in the target schema.
    pub fn table(&self, name: &str) -> String {
        self.namespace.object(name)
    }
}

/// Issues the provisioning statements.
pub struct Provisioner {
    warehouse: WarehouseRef,
    names: ObjectNames,
    integration: IntegrationConfig,
    format: FormatConfig,
    stage_url: String,
}

impl Provisioner {
    pub fn new(warehouse: WarehouseRef, config: &Config) -> Self {
        Self {
            warehouse,
            names: ObjectNames::from_config(config),
            integration: config.integration.clone(),
            format: config.format.clone(),
            stage_url: config.storage.stage_url(),
        }
    }

    /// CREATE OR REPLACE STORAGE INTEGRATION, after checking that every
    /// trust parameter is present.
    pub fn integration_statement(&self) -> Result<String, ProvisionError> {
        let mut missing = Vec::new();
        if self.integration.role_arn.trim().is_empty() {
            missing.push("role ARN");
        }
        if self.integration.external_id.trim().is_empty() {
            missing.push("external ID");
        }
        if self.integration.allowed_locations.is_empty() {
            missing.push("allowed locations");
        }
        ensure!(
            missing.is_empty(),
            MissingIntegrationParameterSnafu { missing }
        );

        Ok(sql::create_storage_integration(
            &self.names.integration,
            &self.integration.role_arn,
            &self.integration.external_id,
            &self.integration.allowed_locations,
        ))
    }

    pub fn database_statements(&self) -> [String; 2] {
        [
            sql::create_database(&self.names.namespace.database),
            sql::create_schema(&self.names.namespace.schema_name()),
        ]
    }

    pub fn stage_statement(&self) -> String {
        sql::create_stage(&self.names.stage, &self.stage_url, &self.names.integration)
    }

    pub fn file_format_statement(&self) -> String {
        sql::create_file_format(
            &self.names.file_format,
            self.format.delimiter,
            self.format.quote,
            self.format.skip_header,
        )
    }

    /// Every statement in execution order, labelled with the object it
    /// creates.
    pub fn plan(&self) -> Result<Vec<(&'static str, String)>, ProvisionError> {
        let [database, schema] = self.database_statements();
        Ok(vec![
            ("storage integration", self.integration_statement()?),
            ("database", database),
            ("schema", schema),
            ("stage", self.stage_statement()),
            ("file format", self.file_format_statement()),
        ])
    }

    pub async fn create_storage_integration(&self) -> Result<(), ProvisionError> {
        let statement = self.integration_statement()?;
        self.run("storage integration", &statement).await?;
        info!(integration = %self.names.integration, "Storage integration ready");
        Ok(())
    }

    pub async fn create_database_and_schema(&self) -> Result<(), ProvisionError> {
        let [database, schema] = self.database_statements();
        self.run("database", &database).await?;
        self.run("schema", &schema).await?;
        info!(schema = %self.names.namespace.schema_name(), "Database and schema ready");
        Ok(())
    }

    pub async fn create_stage(&self) -> Result<(), ProvisionError> {
        self.run("stage", &self.stage_statement()).await?;
        info!(stage = %self.names.stage, url = %self.stage_url, "Stage ready");
        Ok(())
    }

    pub async fn create_file_format(&self) -> Result<(), ProvisionError> {
        self.run("file format", &self.file_format_statement()).await?;
        info!(file_format = %self.names.file_format, "File format ready");
        Ok(())
    }

    async fn run(&self, object: &'static str, statement: &str) -> Result<(), ProvisionError> {
        self.warehouse
            .execute(statement)
            .await
            .context(ProvisionStatementSnafu { object })
    }
}
