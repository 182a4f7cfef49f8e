//! View composition
//!
//! Turns a state snapshot into the structure the front end draws. Running
//! generated SQL and summarizing its results happen here, through the shared
//! caches, so the state machine never performs I/O for display.

mod chart;
mod panel;

pub use chart::{ChartView, CHART_UNAVAILABLE};
pub use panel::{ConfidenceView, FeedbackView, ResultsView, SqlPanel, SummaryView};

use crate::gateway::{ContentItem, Role, Warning};
use crate::state_machine::{ConvState, ConversationState, Notification};
use crate::summarize::Summarizer;
use crate::warehouse::QueryCache;
use panel::{sql_panel, PanelInput};
use serde::Serialize;
use serde_json::Value;

pub const TITLE: &str = "Cortex Analyst";
pub const WELCOME: &str =
    "Welcome to Cortex Analyst! Type your questions below to interact with your data. ";
pub const WAITING: &str = "Waiting for Analyst's response...";

#[derive(Debug, Clone, Serialize)]
pub struct ModelOption {
    pub path: String,
    /// Last path segment
    pub display_name: String,
}

impl ModelOption {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            display_name: path.rsplit('/').next().unwrap_or(path).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderView {
    pub title: &'static str,
    pub welcome: &'static str,
    pub semantic_models: Vec<ModelOption>,
    pub selected_model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionButton {
    /// `suggestion_{message}_{i}`
    pub key: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemView {
    Markdown { text: String },
    Suggestions { buttons: Vec<SuggestionButton> },
    Sql(Box<SqlPanel>),
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub index: usize,
    pub role: Role,
    pub items: Vec<ItemView>,
    /// Analyst messages only
    pub raw_response: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    pub text: &'static str,
    pub icon: &'static str,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            text: n.text(),
            icon: n.icon(),
        }
    }
}

/// Everything the front end shows for one session
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub session_id: String,
    pub version: u64,
    pub phase: ConvState,
    pub header: HeaderView,
    pub messages: Vec<MessageView>,
    /// Warnings of the most recent request
    pub warnings: Vec<Warning>,
    pub notifications: Vec<NotificationView>,
    /// Set while the analyst is working
    pub waiting: Option<&'static str>,
}

/// Shared caches used while rendering
pub struct Renderer<'a> {
    pub queries: &'a QueryCache,
    pub summaries: &'a Summarizer,
}

impl Renderer<'_> {
    /// Compose the view. `notifications` must already be drained from the
    /// session so that each one reaches exactly one render.
    pub async fn render(
        &self,
        session_id: &str,
        state: &ConversationState,
        semantic_models: &[String],
        notifications: Vec<Notification>,
    ) -> ConversationView {
        let mut messages = Vec::with_capacity(state.messages.len());
        for (index, message) in state.messages.iter().enumerate() {
            let mut items = Vec::with_capacity(message.content.len());
            for item in &message.content {
                match item {
                    ContentItem::Text { text } => {
                        items.push(ItemView::Markdown { text: text.clone() });
                    }
                    ContentItem::Suggestions { suggestions } => {
                        items.push(ItemView::Suggestions {
                            buttons: suggestion_buttons(index, suggestions),
                        });
                    }
                    ContentItem::Sql {
                        statement,
                        confidence,
                    } => {
                        let input = PanelInput {
                            statement,
                            confidence: confidence.as_ref(),
                            message_index: index,
                            request_id: message.request_id.as_deref(),
                        };
                        let panel = sql_panel(input, state, self.queries, self.summaries).await;
                        items.push(ItemView::Sql(Box::new(panel)));
                    }
                    ContentItem::Other => {}
                }
            }
            messages.push(MessageView {
                index,
                role: message.role,
                items,
                raw_response: match message.role {
                    Role::Analyst => message.raw_response.clone(),
                    Role::User => None,
                },
            });
        }

        ConversationView {
            session_id: session_id.to_string(),
            version: state.version,
            phase: state.phase,
            header: HeaderView {
                title: TITLE,
                welcome: WELCOME,
                semantic_models: semantic_models.iter().map(|p| ModelOption::new(p)).collect(),
                selected_model: state.semantic_model.clone(),
            },
            messages,
            warnings: state.warnings.clone(),
            notifications: notifications.into_iter().map(Into::into).collect(),
            waiting: state.is_busy().then_some(WAITING),
        }
    }
}

fn suggestion_buttons(message_index: usize, suggestions: &[String]) -> Vec<SuggestionButton> {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, text)| SuggestionButton {
            key: format!("suggestion_{message_index}_{i}"),
            text: text.clone(),
        })
        .collect()
}
