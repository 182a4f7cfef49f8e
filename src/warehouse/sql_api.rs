//! Warehouse backed by the Snowflake SQL API (`/api/v2/statements`)

use super::{Table, Warehouse, WarehouseError};
use crate::config::SnowflakeConfig;
use crate::gateway::{ApiResponse, SnowflakeRestClient, API_TIMEOUT};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const STATEMENTS_ENDPOINT: &str = "/api/v2/statements";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Session context applied to every statement
#[derive(Debug, Clone, Default)]
pub struct StatementContext {
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,
}

impl From<&SnowflakeConfig> for StatementContext {
    fn from(config: &SnowflakeConfig) -> Self {
        Self {
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
            role: config.role.clone(),
        }
    }
}

pub struct SqlApiWarehouse {
    rest: Arc<SnowflakeRestClient>,
    context: StatementContext,
    poll_interval: Duration,
    /// Bound on submit plus polling, matching the per-call timeout
    poll_timeout: Duration,
}

impl SqlApiWarehouse {
    pub fn new(rest: Arc<SnowflakeRestClient>, context: StatementContext) -> Self {
        Self {
            rest,
            context,
            poll_interval: POLL_INTERVAL,
            poll_timeout: API_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn build_request(&self, sql: &str, bindings: &[String]) -> StatementRequest {
        StatementRequest {
            statement: sql.to_string(),
            timeout: API_TIMEOUT.as_secs(),
            warehouse: self.context.warehouse.clone(),
            database: self.context.database.clone(),
            schema: self.context.schema.clone(),
            role: self.context.role.clone(),
            bindings: bindings
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    (
                        (i + 1).to_string(),
                        Binding {
                            r#type: "TEXT",
                            value: value.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Poll an asynchronously executing statement until it finishes
    async fn wait_for_completion(
        &self,
        mut response: ApiResponse,
        started: Instant,
    ) -> Result<ApiResponse, WarehouseError> {
        while response.status == 202 {
            if started.elapsed() >= self.poll_timeout {
                return Err(WarehouseError::Timeout);
            }
            let status_url = parse_statement(&response.body)?
                .statement_status_url
                .ok_or_else(|| WarehouseError::Decode("202 without statementStatusUrl".into()))?;
            tokio::time::sleep(self.poll_interval).await;
            response = self.rest.call(Method::GET, &status_url, None).await?;
        }
        Ok(response)
    }

    /// Fetch partitions after the first one, which arrives inline
    async fn fetch_remaining_partitions(
        &self,
        statement: &StatementResponse,
        rows: &mut Vec<Vec<Value>>,
    ) -> Result<(), WarehouseError> {
        let partitions = statement
            .result_set_meta_data
            .as_ref()
            .map_or(0, |m| m.partition_info.len());
        if partitions <= 1 {
            return Ok(());
        }
        let Some(status_url) = &statement.statement_status_url else {
            return Err(WarehouseError::Decode(
                "partitioned result without statementStatusUrl".into(),
            ));
        };
        for partition in 1..partitions {
            let url = format!("{status_url}?partition={partition}");
            let response = self.rest.call(Method::GET, &url, None).await?;
            if response.status >= 400 {
                return Err(statement_error(&response));
            }
            rows.extend(parse_statement(&response.body)?.data);
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for SqlApiWarehouse {
    async fn query(&self, sql: &str, bindings: &[String]) -> Result<Table, WarehouseError> {
        let started = Instant::now();
        let request = self.build_request(sql, bindings);
        let body =
            serde_json::to_value(&request).map_err(|e| WarehouseError::Decode(e.to_string()))?;

        let response = self
            .rest
            .call(Method::POST, STATEMENTS_ENDPOINT, Some(&body))
            .await?;
        let response = self.wait_for_completion(response, started).await?;
        if response.status >= 400 {
            return Err(statement_error(&response));
        }

        let statement = parse_statement(&response.body)?;
        let mut rows = statement.data.clone();
        self.fetch_remaining_partitions(&statement, &mut rows).await?;

        let columns = statement
            .result_set_meta_data
            .map(|m| m.row_type.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        tracing::debug!(
            duration_ms = %started.elapsed().as_millis(),
            rows = rows.len(),
            "Statement completed"
        );
        Ok(Table::new(columns, rows))
    }
}

fn parse_statement(body: &Value) -> Result<StatementResponse, WarehouseError> {
    serde_json::from_value(body.clone())
        .map_err(|e| WarehouseError::Decode(format!("Unexpected statement response: {e}")))
}

fn statement_error(response: &ApiResponse) -> WarehouseError {
    let parsed = parse_statement(&response.body).ok();
    let code = parsed
        .as_ref()
        .and_then(|s| s.code.clone())
        .unwrap_or_else(|| response.status.to_string());
    let message = parsed
        .and_then(|s| s.message)
        .unwrap_or_else(|| response.body.to_string());
    WarehouseError::Statement { code, message }
}

#[derive(Debug, Serialize)]
struct StatementRequest {
    statement: String,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding>,
}

#[derive(Debug, Serialize)]
struct Binding {
    r#type: &'static str,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnType {
    name: String,
}
