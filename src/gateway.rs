//! Cortex Analyst gateway
//!
//! Talks to the two analyst endpoints and turns their envelopes into
//! `AnalystReply` / `AnalystFailure` values the state machine understands.

mod client;
mod error;
mod types;

pub use client::{ApiResponse, SnowflakeRestClient, API_TIMEOUT};
pub use error::{GatewayError, GatewayErrorKind};
pub use types::*;

use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

pub const MESSAGE_ENDPOINT: &str = "/api/v2/cortex/analyst/message";
pub const FEEDBACK_ENDPOINT: &str = "/api/v2/cortex/analyst/feedback";

/// The hosted text-to-SQL service, as seen by a session
#[async_trait]
pub trait AnalystGateway: Send + Sync {
    /// Send the conversation so far and get the analyst's next turn
    async fn send_message(&self, request: &MessageRequest) -> Result<AnalystReply, AnalystFailure>;

    /// Submit feedback for one analyst reply. `None` means accepted;
    /// otherwise the displayable error text.
    async fn send_feedback(&self, request: &FeedbackRequest) -> Option<String>;
}

#[async_trait]
impl<T: AnalystGateway + ?Sized> AnalystGateway for Arc<T> {
    async fn send_message(&self, request: &MessageRequest) -> Result<AnalystReply, AnalystFailure> {
        (**self).send_message(request).await
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Option<String> {
        (**self).send_feedback(request).await
    }
}

/// Production gateway backed by the Snowflake REST API
pub struct CortexAnalyst {
    rest: Arc<SnowflakeRestClient>,
}

impl CortexAnalyst {
    pub fn new(rest: Arc<SnowflakeRestClient>) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl AnalystGateway for CortexAnalyst {
    async fn send_message(&self, request: &MessageRequest) -> Result<AnalystReply, AnalystFailure> {
        let body = serde_json::to_value(request)
            .map_err(|e| AnalystFailure::from_transport(format!("Invalid request: {e}"), None))?;
        let response = self
            .rest
            .call(Method::POST, MESSAGE_ENDPOINT, Some(&body))
            .await
            .map_err(|e| AnalystFailure::from_transport(e.message, e.status))?;
        interpret_message_response(response)
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Option<String> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => return Some(format!("Invalid feedback: {e}")),
        };
        match self
            .rest
            .call(Method::POST, FEEDBACK_ENDPOINT, Some(&body))
            .await
        {
            Ok(response) => interpret_feedback_response(response),
            Err(e) => Some(AnalystFailure::from_transport(e.message, e.status).render()),
        }
    }
}

/// Status < 400 is a reply; anything else is an error envelope
pub(crate) fn interpret_message_response(
    response: ApiResponse,
) -> Result<AnalystReply, AnalystFailure> {
    if response.status >= 400 {
        return Err(AnalystFailure::from_api(response.status, response.body));
    }

    let parsed: MessageResponse = serde_json::from_value(response.body.clone()).map_err(|e| {
        AnalystFailure {
            raw: Some(response.body.clone()),
            ..AnalystFailure::from_transport(
                format!("Unexpected response shape: {e}"),
                Some(response.status),
            )
        }
    })?;

    Ok(AnalystReply {
        content: parsed.message.content,
        request_id: parsed.request_id,
        warnings: parsed.warnings,
        raw: response.body,
    })
}

/// Only HTTP 200 counts as accepted feedback
pub(crate) fn interpret_feedback_response(response: ApiResponse) -> Option<String> {
    if response.status == 200 {
        return None;
    }
    Some(AnalystFailure::from_api(response.status, response.body).render())
}

/// Logging wrapper for gateways
pub struct LoggingGateway {
    inner: Arc<dyn AnalystGateway>,
}

impl LoggingGateway {
    pub fn new(inner: Arc<dyn AnalystGateway>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AnalystGateway for LoggingGateway {
    async fn send_message(&self, request: &MessageRequest) -> Result<AnalystReply, AnalystFailure> {
        let start = std::time::Instant::now();
        let result = self.inner.send_message(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    path = MESSAGE_ENDPOINT,
                    duration_ms = %duration.as_millis(),
                    request_id = %reply.request_id,
                    history_len = request.messages.len(),
                    warnings = reply.warnings.as_ref().map_or(0, Vec::len),
                    "Analyst request completed"
                );
            }
            Err(failure) => {
                tracing::error!(
                    path = MESSAGE_ENDPOINT,
                    duration_ms = %duration.as_millis(),
                    status = ?failure.status,
                    request_id = ?failure.request_id,
                    error_code = ?failure.error_code,
                    error = %failure.message,
                    "Analyst request failed"
                );
            }
        }

        result
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Option<String> {
        let start = std::time::Instant::now();
        let result = self.inner.send_feedback(request).await;
        let duration = start.elapsed();

        if result.is_some() {
            tracing::warn!(
                path = FEEDBACK_ENDPOINT,
                duration_ms = %duration.as_millis(),
                request_id = %request.request_id,
                "Feedback submission failed"
            );
        } else {
            tracing::info!(
                path = FEEDBACK_ENDPOINT,
                duration_ms = %duration.as_millis(),
                request_id = %request.request_id,
                positive = request.positive,
                "Feedback submitted"
            );
        }

        result
    }
}
