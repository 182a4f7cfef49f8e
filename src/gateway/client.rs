//! Authenticated JSON client for the Snowflake REST API

use super::GatewayError;
use crate::config::SnowflakeConfig;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

/// Fixed bound on every call; there is no per-call override
pub const API_TIMEOUT: Duration = Duration::from_millis(50_000);

/// Parsed response: JSON body (or `Null` when empty) plus HTTP status
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// Thin wrapper around `reqwest` that signs every request
pub struct SnowflakeRestClient {
    client: Client,
    base_url: String,
    token: String,
    token_type: String,
}

impl SnowflakeRestClient {
    pub fn new(config: &SnowflakeConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::client(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.account_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            token_type: config.token_type.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.token_type)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("cortex-chat/", env!("CARGO_PKG_VERSION")))
    }

    /// Single attempt, no retry. Non-2xx statuses are not errors here: the
    /// caller decides what a status means for its endpoint.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, GatewayError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = GatewayError::from(e);
                tracing::warn!(
                    path,
                    kind = error.kind.as_str(),
                    error = %error.message,
                    "Snowflake request failed"
                );
                return Err(error);
            }
        };
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;

        Ok(ApiResponse {
            status,
            body: parse_body(&text).map_err(|e| e.with_status(status))?,
        })
    }
}

fn parse_body(text: &str) -> Result<Value, GatewayError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| GatewayError::decode(format!("Failed to parse response: {e} - body: {text}")))
}
