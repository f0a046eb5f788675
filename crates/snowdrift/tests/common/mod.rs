//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    GetOptions, GetResult, ListResult, ObjectMeta, ObjectStore, PutMultipartOptions, PutOptions,
    PutPayload, PutResult, Result as ObjectStoreResult,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use snowdrift::config::Config;
use snowdrift::error::WarehouseError;
use snowdrift::{ResultSet, Warehouse};

pub const CONFIG_YAML: &str = r#"
storage:
  bucket: landing
  prefix: raw_data
  archive_prefix: archive
discovery:
  extensions: [csv]
warehouse:
  account: acct
  database: DB
  schema: RAW
  token: test-token
objects:
  stage: landing_stage
format:
  delimiter: ","
integration:
  role_arn: arn:aws:iam::123456789012:role/loader
  external_id: ext-1
  allowed_locations: ["s3://landing/raw_data/"]
"#;

pub fn config() -> Config {
    Config::parse_with(CONFIG_YAML, |_| None).unwrap()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn status(message: &str) -> ResultSet {
    ResultSet::new(strings(&["status"]), vec![vec![Some(message.to_string())]])
}

/// Warehouse fake that records every statement and answers the few shapes
/// the pipeline issues.
#[derive(Default)]
pub struct FakeWarehouse {
    statements: Mutex<Vec<String>>,
    /// (location suffix, [(column, type)]) answers for INFER_SCHEMA.
    inferred: Mutex<Vec<(String, Vec<(String, String)>)>>,
    tables: Mutex<HashSet<String>>,
    /// Statements containing any of these fragments fail.
    failing: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer inference for the staged file ending in `relative_path`.
    pub fn infer(&self, relative_path: &str, columns: &[(&str, &str)]) {
        self.inferred.lock().unwrap().push((
            format!("/{relative_path}'"),
            columns
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
        ));
    }

    pub fn fail_on(&self, fragment: &str) {
        self.failing.lock().unwrap().push(fragment.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }

    fn infer_result(&self, sql: &str) -> ResultSet {
        let inferred = self.inferred.lock().unwrap();
        let columns = inferred
            .iter()
            .find(|(suffix, _)| sql.contains(suffix.as_str()))
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default();

        let rows = columns
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                vec![Some(name), Some(ty), Some("true".to_string()), Some(i.to_string())]
            })
            .collect();
        ResultSet::new(strings(&["COLUMN_NAME", "TYPE", "NULLABLE", "ORDER_ID"]), rows)
    }

    fn create_table(&self, sql: &str) -> ResultSet {
        let name = sql
            .trim_start_matches("CREATE TABLE IF NOT EXISTS ")
            .split(" (")
            .next()
            .unwrap_or_default()
            .to_string();
        if self.tables.lock().unwrap().insert(name.clone()) {
            status(&format!("Table {name} successfully created."))
        } else {
            status(&format!("{name} already exists, statement succeeded."))
        }
    }

    fn copy_into(&self, sql: &str) -> ResultSet {
        let file = sql
            .split("PATTERN = '")
            .nth(1)
            .and_then(|rest| rest.split('\'').next())
            .unwrap_or_default()
            .to_string();
        ResultSet::new(
            strings(&["file", "status", "rows_loaded", "errors_seen", "first_error"]),
            vec![vec![
                Some(file),
                Some("LOADED".to_string()),
                Some("2".to_string()),
                Some("0".to_string()),
                None,
            ]],
        )
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn query(&self, sql: &str) -> Result<ResultSet, WarehouseError> {
        self.statements.lock().unwrap().push(sql.to_string());

        let failing = self.failing.lock().unwrap().clone();
        if failing.iter().any(|fragment| sql.contains(fragment.as_str())) {
            return Err(WarehouseError::Statement {
                status: 422,
                code: "002003".to_string(),
                message: "SQL compilation error".to_string(),
            });
        }

        Ok(if sql.starts_with("SELECT COLUMN_NAME") {
            self.infer_result(sql)
        } else if sql.starts_with("CREATE TABLE") {
            self.create_table(sql)
        } else if sql.starts_with("COPY INTO") {
            self.copy_into(sql)
        } else {
            status("Statement executed successfully.")
        })
    }
}

/// In-memory store whose deletes always fail.
#[derive(Debug, Default)]
pub struct FailingDeleteStore {
    inner: InMemory,
}

impl FailingDeleteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for FailingDeleteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailingDeleteStore")
    }
}

#[async_trait]
impl ObjectStore for FailingDeleteStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> ObjectStoreResult<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOptions,
    ) -> ObjectStoreResult<Box<dyn object_store::MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> ObjectStoreResult<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, _location: &Path) -> ObjectStoreResult<()> {
        Err(object_store::Error::Generic {
            store: "FailingDeleteStore",
            source: "delete denied".into(),
        })
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, ObjectStoreResult<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> ObjectStoreResult<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> ObjectStoreResult<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> ObjectStoreResult<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
