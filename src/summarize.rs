//! Result summaries using Cortex COMPLETE
//!
//! Sends a short preview of a result table to the hosted completion
//! function and returns prose. Failures never block the results themselves.

use crate::warehouse::{cell_text, Table, Warehouse, WarehouseError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Rows included in the preview, to stay inside the token budget
pub const PREVIEW_ROWS: usize = 5;

const COMPLETE_SQL: &str =
    "SELECT SNOWFLAKE.CORTEX.COMPLETE(?, PARSE_JSON(?), PARSE_JSON(?)) AS RESPONSE";
const RESPONSE_COLUMN: &str = "RESPONSE";
const TEMPERATURE: u32 = 0;
const MAX_TOKENS: u32 = 500;

const SUMMARY_PROMPT: &str = "Summarize the following data in detail in order to help user understand their data.
Focus on key insights, trends, or patterns.
Do not include the raw data in the summary.
Round up to the nearest 0.1
Latency is listed as avg seconds

Data:";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("No summary returned from Cortex Complete")]
    NoResponse,
    #[error("Invalid response format from Cortex Complete")]
    InvalidFormat,
    #[error("Could not build data preview: {0}")]
    Preview(#[from] csv::Error),
}

pub struct Summarizer {
    warehouse: Arc<dyn Warehouse>,
    model: String,
    /// Successful summaries by SQL text; failures are retried on next view
    cache: RwLock<HashMap<String, String>>,
}

impl Summarizer {
    pub fn new(warehouse: Arc<dyn Warehouse>, model: impl Into<String>) -> Self {
        Self {
            warehouse,
            model: model.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Summarize `table`, reusing an earlier summary of the same statement
    pub async fn summarize_cached(&self, sql: &str, table: &Table) -> Result<String, SummaryError> {
        if let Some(hit) = self.cache.read().await.get(sql) {
            return Ok(hit.clone());
        }
        let summary = self.summarize(table).await?;
        self.cache
            .write()
            .await
            .insert(sql.to_string(), summary.clone());
        Ok(summary)
    }

    pub async fn summarize(&self, table: &Table) -> Result<String, SummaryError> {
        let prompt = json!([{ "role": "user", "content": build_prompt(table)? }]);
        let options = json!({ "temperature": TEMPERATURE, "max_tokens": MAX_TOKENS });

        let result = self
            .warehouse
            .query(
                COMPLETE_SQL,
                &[self.model.clone(), prompt.to_string(), options.to_string()],
            )
            .await?;

        extract_summary(&result)
    }
}

/// Fixed instructions followed by a CSV preview of the first rows
pub fn build_prompt(table: &Table) -> Result<String, csv::Error> {
    let preview = table.head(PREVIEW_ROWS).to_csv()?;
    Ok(format!("{SUMMARY_PROMPT}\n{preview}"))
}

/// `RESPONSE` holds a JSON document whose `choices[0].messages` is the text
fn extract_summary(result: &Table) -> Result<String, SummaryError> {
    if result.is_empty() || result.column_index(RESPONSE_COLUMN).is_none() {
        return Err(SummaryError::NoResponse);
    }
    let raw = result
        .cell(0, RESPONSE_COLUMN)
        .ok_or(SummaryError::NoResponse)?;

    let parsed: Value = match raw {
        Value::String(s) => serde_json::from_str(s).map_err(|_| SummaryError::InvalidFormat)?,
        Value::Object(_) => raw.clone(),
        _ => return Err(SummaryError::InvalidFormat),
    };

    parsed
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("messages"))
        .map(cell_text)
        .ok_or(SummaryError::InvalidFormat)
}
