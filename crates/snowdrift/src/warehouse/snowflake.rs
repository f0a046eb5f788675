//! Snowflake SQL API v2 client.
//!
//! Statements are submitted with `POST /api/v2/statements`. A `200` carries
//! the first result partition; a `202` means the statement is still running
//! and its `statementStatusUrl` is polled until it completes or the statement
//! timeout passes. Remaining partitions are fetched with `?partition=N`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use snowdrift_core::emit;
use snowdrift_core::metrics::events::WarehouseStatement;

use super::{ResultSet, Warehouse};
use crate::config::{TokenType, WarehouseConfig};
use crate::error::{
    ClientBuildSnafu, DecodeSnafu, MissingStatusUrlSnafu, RequestSnafu, TimeoutSnafu,
    WarehouseError,
};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const CLIENT_NAME: &str = concat!("snowdrift/", env!("CARGO_PKG_VERSION"));

/// Extra time the client waits past the server-side statement timeout.
const POLL_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<Option<String>>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PartitionResponse {
    #[serde(default)]
    data: Option<Vec<Vec<Option<String>>>>,
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, WarehouseError> {
    serde_json::from_slice(body).context(DecodeSnafu)
}

/// Turn a non-success response into an error, keeping Snowflake's code and
/// message when the body has them.
fn statement_error(status: StatusCode, body: &[u8]) -> WarehouseError {
    let parsed: StatementResponse = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());
    WarehouseError::Statement {
        status: status.as_u16(),
        code: parsed.code.unwrap_or_else(|| "unknown".to_string()),
        message,
    }
}

/// Warehouse client for the Snowflake SQL REST API.
pub struct SnowflakeClient {
    http: Client,
    base_url: String,
    token: String,
    token_type: TokenType,
    warehouse: Option<String>,
    role: Option<String>,
    statement_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for SnowflakeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SnowflakeClient<{}>", self.base_url)
    }
}

impl SnowflakeClient {
    pub fn new(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            token: config.token.clone(),
            token_type: config.token_type,
            warehouse: config.warehouse.clone(),
            role: config.role.clone(),
            statement_timeout: Duration::from_secs(config.statement_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Status URLs come back relative to the account host.
    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_url, url)
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(TOKEN_TYPE_HEADER, self.token_type.as_str())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_NAME)
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Bytes), WarehouseError> {
        let response = request.send().await.context(RequestSnafu)?;
        let status = response.status();
        let body = response.bytes().await.context(RequestSnafu)?;
        Ok((status, body))
    }

    async fn submit(&self, sql: &str) -> Result<StatementResponse, WarehouseError> {
        let body = StatementRequest {
            statement: sql,
            timeout: self.statement_timeout.as_secs(),
            warehouse: self.warehouse.as_deref(),
            role: self.role.as_deref(),
        };
        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);
        let (status, bytes) = self.send(self.request(Method::POST, &url).json(&body)).await?;
        self.await_completion(status, bytes).await
    }

    async fn await_completion(
        &self,
        mut status: StatusCode,
        mut body: Bytes,
    ) -> Result<StatementResponse, WarehouseError> {
        let deadline = Instant::now() + self.statement_timeout + POLL_GRACE;

        loop {
            match status {
                StatusCode::OK => return decode(&body),
                StatusCode::ACCEPTED => {
                    let pending: StatementResponse = decode(&body)?;
                    let url = pending.statement_status_url.context(MissingStatusUrlSnafu)?;
                    let handle = pending.statement_handle.unwrap_or_default();
                    ensure!(
                        Instant::now() < deadline,
                        TimeoutSnafu {
                            handle: handle.clone(),
                            seconds: self.statement_timeout.as_secs(),
                        }
                    );

                    trace!(handle = %handle, "Statement still running");
                    tokio::time::sleep(self.poll_interval).await;
                    (status, body) = self
                        .send(self.request(Method::GET, &self.absolute(&url)))
                        .await?;
                }
                _ => return Err(statement_error(status, &body)),
            }
        }
    }

    async fn fetch_partition(
        &self,
        handle: &str,
        partition: usize,
    ) -> Result<Vec<Vec<Option<String>>>, WarehouseError> {
        let url = format!(
            "{}{}/{}?partition={}",
            self.base_url, STATEMENTS_PATH, handle, partition
        );
        let (status, body) = self.send(self.request(Method::GET, &url)).await?;
        if status != StatusCode::OK {
            return Err(statement_error(status, &body));
        }
        let response: PartitionResponse = decode(&body)?;
        Ok(response.data.unwrap_or_default())
    }

    async fn collect(&self, response: StatementResponse) -> Result<ResultSet, WarehouseError> {
        let partitions = response
            .result_set_meta_data
            .as_ref()
            .map_or(0, |meta| meta.partition_info.len());
        let handle = response.statement_handle.clone().unwrap_or_default();
        let mut result = into_result_set(response);

        for partition in 1..partitions {
            let rows = self.fetch_partition(&handle, partition).await?;
            result.rows.extend(rows);
        }

        Ok(result)
    }
}

fn into_result_set(response: StatementResponse) -> ResultSet {
    let columns = response
        .result_set_meta_data
        .map(|meta| meta.row_type.into_iter().map(|row| row.name).collect())
        .unwrap_or_default();
    ResultSet::new(columns, response.data.unwrap_or_default())
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    async fn query(&self, sql: &str) -> Result<ResultSet, WarehouseError> {
        debug!(
            statement = sql.lines().next().unwrap_or_default(),
            "Executing statement"
        );
        trace!(sql, "Statement text");

        let start = Instant::now();
        let result = match self.submit(sql).await {
            Ok(response) => self.collect(response).await,
            Err(e) => Err(e),
        };

        emit!(WarehouseStatement {
            success: result.is_ok(),
            duration: start.elapsed(),
        });

        result
    }
}
