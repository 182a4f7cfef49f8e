//! Cortex Analyst wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Analyst,
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Suggestions {
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
        #[serde(default)]
        confidence: Option<Confidence>,
    },
    /// Item types this client does not know how to show
    #[serde(other)]
    Other,
}

impl ContentItem {
    pub fn text(s: impl Into<String>) -> Self {
        ContentItem::Text { text: s.into() }
    }

    pub fn sql(statement: impl Into<String>) -> Self {
        ContentItem::Sql {
            statement: statement.into(),
            confidence: None,
        }
    }
}

/// Provenance attached to generated SQL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    #[serde(default)]
    pub verified_query_used: Option<VerifiedQueryInfo>,
}

/// A human-validated query reused to answer the question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedQueryInfo {
    pub name: String,
    pub question: String,
    pub verified_by: String,
    /// Unix seconds
    pub verified_at: i64,
    pub sql: String,
}

/// Non-fatal warning attached to an analyst response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
}

/// Message as sent to the analyst API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalystMessage {
    pub role: Role,
    pub content: Vec<ContentItem>,
}

/// Body of `POST /api/v2/cortex/analyst/message`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRequest {
    pub messages: Vec<AnalystMessage>,
    pub semantic_model_file: String,
}

/// Body of `POST /api/v2/cortex/analyst/feedback`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub positive: bool,
    pub feedback_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageResponse {
    pub message: ResponseMessage,
    pub request_id: String,
    #[serde(default)]
    pub warnings: Option<Vec<Warning>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Vec<ContentItem>,
}

/// Error envelope returned with any status >= 400
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub warnings: Option<Vec<Warning>>,
}

/// Successful analyst answer
#[derive(Debug, Clone, PartialEq)]
pub struct AnalystReply {
    pub content: Vec<ContentItem>,
    pub request_id: String,
    pub warnings: Option<Vec<Warning>>,
    /// Full response payload, kept for inspection
    pub raw: Value,
}

/// Failed analyst call, either rejected by the API or lost in transport
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("analyst API error: {message}")]
pub struct AnalystFailure {
    pub status: Option<u16>,
    pub request_id: Option<String>,
    pub error_code: Option<String>,
    pub message: String,
    pub warnings: Option<Vec<Warning>>,
    pub raw: Option<Value>,
}

impl AnalystFailure {
    pub(crate) fn from_api(status: u16, raw: Value) -> Self {
        let body: ApiErrorBody = serde_json::from_value(raw.clone()).unwrap_or_default();
        let message = body.message.unwrap_or_else(|| match &raw {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        });
        Self {
            status: Some(status),
            request_id: body.request_id,
            error_code: body.error_code,
            message,
            warnings: body.warnings,
            raw: Some(raw),
        }
    }

    pub(crate) fn from_transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            status,
            request_id: None,
            error_code: None,
            message: message.into(),
            warnings: None,
            raw: None,
        }
    }

    /// Human-readable multi-line description shown as the analyst's turn
    pub fn render(&self) -> String {
        fn or_unknown(value: Option<&str>) -> &str {
            value.unwrap_or("unknown")
        }
        let status = self
            .status
            .map_or_else(|| "none".to_string(), |s| s.to_string());
        format!(
            "🚨 An Analyst API error has occurred 🚨\n\
             \n\
             * response code: `{status}`\n\
             * request-id: `{}`\n\
             * error code: `{}`\n\
             \n\
             Message:\n\
             ```\n\
             {}\n\
             ```",
            or_unknown(self.request_id.as_deref()),
            or_unknown(self.error_code.as_deref()),
            self.message,
        )
    }
}
