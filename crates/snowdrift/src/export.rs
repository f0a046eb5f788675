//! Export every table in the target schema as CSV inside one zip archive.

use snafu::prelude::*;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::Config;
use crate::error::{
    ExportCsvSnafu, ExportEntrySnafu, ExportError, ExportFileSnafu, ExportTableSnafu,
    ExportZipSnafu, ListTablesSnafu,
};
use crate::sql::{self, Namespace};
use crate::warehouse::{ResultSet, WarehouseRef};

/// Archive name the CLI writes when no output path is given.
pub const DEFAULT_ARCHIVE: &str = "snowflake_tables.zip";

/// One table written to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableExport {
    pub table: String,
    pub entry: String,
    pub rows: usize,
}

/// Archive entry for a table. Path separators would create directories.
pub fn entry_name(table: &str) -> String {
    format!("{}.csv", table.replace(['/', '\\'], "_"))
}

pub struct Exporter {
    warehouse: WarehouseRef,
    namespace: Namespace,
}

impl Exporter {
    pub fn new(warehouse: WarehouseRef, config: &Config) -> Self {
        Self {
            warehouse,
            namespace: config.warehouse.namespace(),
        }
    }

    /// Base tables in the target schema, sorted by name.
    pub async fn tables(&self) -> Result<Vec<String>, ExportError> {
        let rows = self
            .warehouse
            .query(&sql::list_tables(
                &self.namespace.database,
                &self.namespace.schema,
            ))
            .await
            .context(ListTablesSnafu {
                schema: self.namespace.schema_name(),
            })?;

        Ok((0..rows.len())
            .filter_map(|row| rows.value(row, "TABLE_NAME"))
            .map(str::to_string)
            .collect())
    }

    /// Write every table to `writer` as a zip archive with one
    /// `<table>.csv` entry each, header row first.
    pub async fn export<W: Write + Seek>(
        &self,
        writer: W,
    ) -> Result<(W, Vec<TableExport>), ExportError> {
        let tables = self.tables().await?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(writer);
        let mut exported = Vec::with_capacity(tables.len());

        for table in tables {
            let rows = self
                .warehouse
                .query(&sql::select_all(&self.namespace.object(&table)))
                .await
                .context(ExportTableSnafu { table: &table })?;

            let entry = entry_name(&table);
            zip.start_file(entry.as_str(), options)
                .context(ExportZipSnafu)?;
            write_csv(&mut zip, &table, &entry, &rows)?;

            debug!(table = %table, rows = rows.len(), "Exported table");
            exported.push(TableExport {
                table,
                entry,
                rows: rows.len(),
            });
        }

        let writer = zip.finish().context(ExportZipSnafu)?;
        Ok((writer, exported))
    }

    /// Export to a file at `path`, replacing it if it exists.
    pub async fn export_to(&self, path: &Path) -> Result<Vec<TableExport>, ExportError> {
        let file = File::create(path).context(ExportFileSnafu { path })?;
        let (_, exported) = self.export(file).await?;
        info!(
            path = %path.display(),
            tables = exported.len(),
            rows = exported.iter().map(|t| t.rows).sum::<usize>(),
            "Exported schema"
        );
        Ok(exported)
    }
}

/// NULL is written as an empty field.
fn write_csv<W: Write>(
    out: W,
    table: &str,
    entry: &str,
    rows: &ResultSet,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    if !rows.columns.is_empty() {
        writer
            .write_record(&rows.columns)
            .context(ExportCsvSnafu { table })?;
    }
    for row in &rows.rows {
        writer
            .write_record(row.iter().map(|value| value.as_deref().unwrap_or_default()))
            .context(ExportCsvSnafu { table })?;
    }
    writer.flush().context(ExportEntrySnafu { entry })
}
