//! API request and response types

use crate::presentation::ModelOption;
use crate::state_machine::ChartKind;
use serde::{Deserialize, Serialize};

/// Request to create a new session
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub semantic_model: Option<String>,
}

/// Request to send a question, typed or picked from suggestions
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to switch the semantic model
#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub path: String,
}

/// Rating for one analyst reply
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub positive: bool,
    #[serde(default)]
    pub message: String,
}

/// Axis and chart type for one message's results
#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    pub message_index: usize,
    pub x: String,
    pub y: String,
    #[serde(default)]
    pub kind: ChartKind,
}

/// Response with a freshly created session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub semantic_model: String,
}

/// Response for queued actions
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub queued: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelOption>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
