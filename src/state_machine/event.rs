//! Events that can occur in a conversation

use super::state::ChartSelection;
use crate::gateway::{AnalystFailure, AnalystReply};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserTurn {
        text: String,
    },
    SuggestionSelected {
        text: String,
    },
    /// Runtime acknowledgement that the pending suggestion is being acted on
    SuggestionConsumed,
    Reset,
    SelectModel {
        path: String,
    },
    FeedbackRequested {
        request_id: String,
        positive: bool,
        message: String,
    },
    ChartSelected {
        message_index: usize,
        selection: ChartSelection,
    },

    // Gateway events
    AnalystReplied {
        reply: AnalystReply,
    },
    AnalystFailed {
        failure: AnalystFailure,
    },
    FeedbackCompleted {
        request_id: String,
        error: Option<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserTurn { .. } => "user_turn",
            Event::SuggestionSelected { .. } => "suggestion_selected",
            Event::SuggestionConsumed => "suggestion_consumed",
            Event::Reset => "reset",
            Event::SelectModel { .. } => "select_model",
            Event::FeedbackRequested { .. } => "feedback_requested",
            Event::ChartSelected { .. } => "chart_selected",
            Event::AnalystReplied { .. } => "analyst_replied",
            Event::AnalystFailed { .. } => "analyst_failed",
            Event::FeedbackCompleted { .. } => "feedback_completed",
        }
    }
}
