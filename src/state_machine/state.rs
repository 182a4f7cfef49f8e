//! Conversation state types

use crate::gateway::{AnalystMessage, ContentItem, Role, Warning};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Messages
// ============================================================================

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentItem>,
    /// Set on analyst replies
    pub request_id: Option<String>,
    /// Full API payload behind an analyst reply
    pub raw_response: Option<Value>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentItem::text(text)],
            request_id: None,
            raw_response: None,
        }
    }

    pub fn analyst(
        content: Vec<ContentItem>,
        request_id: Option<String>,
        raw_response: Option<Value>,
    ) -> Self {
        Self {
            role: Role::Analyst,
            content,
            request_id,
            raw_response,
        }
    }

    /// Wire form: role and content only. Unknown items are not echoed back.
    pub fn to_wire(&self) -> AnalystMessage {
        AnalystMessage {
            role: self.role,
            content: self
                .content
                .iter()
                .filter(|item| !matches!(item, ContentItem::Other))
                .cloned()
                .collect(),
        }
    }

    pub fn has_sql(&self) -> bool {
        self.content
            .iter()
            .any(|item| matches!(item, ContentItem::Sql { .. }))
    }
}

// ============================================================================
// Feedback, notifications, charts
// ============================================================================

/// Feedback outcome for one analyst reply. Any record disables the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedbackRecord {
    Pending,
    Submitted,
    Failed { error: String },
}

/// One-shot message for the next render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    ApiError,
}

impl Notification {
    pub fn text(self) -> &'static str {
        match self {
            Notification::ApiError => "An API error has occurred!",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Notification::ApiError => "🚨",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
}

impl ChartKind {
    pub const ALL: [ChartKind; 2] = [ChartKind::Line, ChartKind::Bar];

    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Line => "Line Chart 📈",
            ChartKind::Bar => "Bar Chart 📊",
        }
    }
}

/// Axis and chart type picked for one message's results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSelection {
    pub x: String,
    pub y: String,
    #[serde(default)]
    pub kind: ChartKind,
}

// ============================================================================
// Conversation State
// ============================================================================

/// Request lifecycle
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvState {
    /// Waiting for input
    #[default]
    Idle,
    /// Analyst request in flight
    AwaitingResponse,
}

impl ConvState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::AwaitingResponse => "awaiting_response",
        }
    }
}

/// Everything a session knows. Only `transition` produces new values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationState {
    pub phase: ConvState,
    /// Append-only; indices are stable widget keys
    pub messages: Vec<Message>,
    /// Warnings of the most recent request only
    pub warnings: Vec<Warning>,
    pub feedback: HashMap<String, FeedbackRecord>,
    pub semantic_model: String,
    pub active_suggestion: Option<String>,
    pub chart_selections: BTreeMap<usize, ChartSelection>,
    /// Bumped on every successful transition
    pub version: u64,
}

impl ConversationState {
    pub fn new(semantic_model: impl Into<String>) -> Self {
        Self {
            phase: ConvState::Idle,
            messages: Vec::new(),
            warnings: Vec::new(),
            feedback: HashMap::new(),
            semantic_model: semantic_model.into(),
            active_suggestion: None,
            chart_selections: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.phase == ConvState::AwaitingResponse
    }

    /// Whether `request_id` belongs to an analyst reply in the history
    pub fn has_analyst_request(&self, request_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == Role::Analyst && m.request_id.as_deref() == Some(request_id))
    }

    /// Same model and version, everything else empty
    pub fn cleared(&self) -> Self {
        Self {
            version: self.version,
            ..Self::new(self.semantic_model.clone())
        }
    }
}

/// Session configuration (immutable for the session's lifetime)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub session_id: String,
    pub semantic_models: Vec<String>,
    /// Maximum number of messages resent per turn; `None` is unbounded
    pub history_window: Option<usize>,
}

impl ConvContext {
    pub fn new(session_id: impl Into<String>, semantic_models: Vec<String>) -> Self {
        Self {
            session_id: session_id.into(),
            semantic_models,
            history_window: None,
        }
    }

    pub fn with_history_window(mut self, window: Option<usize>) -> Self {
        self.history_window = window;
        self
    }

    pub fn knows_model(&self, path: &str) -> bool {
        self.semantic_models.iter().any(|m| m == path)
    }
}
