//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! result; all I/O is described by the returned effects.

use super::state::{ConvState, FeedbackRecord, Message, Notification};
use super::{ConvContext, ConversationState, Effect, Event};
use crate::gateway::{ContentItem, MessageRequest, Role};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    /// No change at all: same version, no effects
    pub fn unchanged(state: &ConversationState) -> Self {
        Self::new(state.clone())
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A request is already in progress, wait for the analyst to respond")]
    Busy,
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Unknown semantic model: {0}")]
    UnknownSemanticModel(String),
    #[error("No analyst reply with request id {0}")]
    UnknownRequest(String),
    #[error("Feedback was already submitted for request {0}")]
    FeedbackAlreadySubmitted(String),
    #[error("Invalid chart selection: {0}")]
    InvalidChartSelection(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &ConversationState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // User turns
        // ============================================================
        Event::UserTurn { text } => {
            ensure_idle(state)?;
            start_turn(state.clone(), context, text)
        }

        Event::SuggestionSelected { text } => {
            ensure_idle(state)?;
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            let mut next = state.clone();
            next.active_suggestion = Some(text);
            Ok(commit(next)
                .with_effect(Effect::Publish)
                .with_effect(Effect::ConsumeSuggestion))
        }

        // The pointer is cleared before the turn starts, so a repeated
        // acknowledgement finds nothing to act on
        Event::SuggestionConsumed => {
            let Some(text) = state.active_suggestion.clone() else {
                return Ok(TransitionResult::unchanged(state));
            };
            ensure_idle(state)?;
            let mut next = state.clone();
            next.active_suggestion = None;
            start_turn(next, context, text)
        }

        // ============================================================
        // Analyst responses
        // ============================================================
        Event::AnalystReplied { reply } => {
            ensure_awaiting(state, "analyst_replied")?;
            let mut next = state.clone();
            if let Some(warnings) = reply.warnings {
                next.warnings = warnings;
            }
            next.messages.push(Message::analyst(
                reply.content,
                Some(reply.request_id),
                Some(reply.raw),
            ));
            next.phase = ConvState::Idle;
            Ok(commit(next).with_effect(Effect::Publish))
        }

        Event::AnalystFailed { failure } => {
            ensure_awaiting(state, "analyst_failed")?;
            let mut next = state.clone();
            if let Some(warnings) = failure.warnings.clone() {
                next.warnings = warnings;
            }
            next.messages.push(Message::analyst(
                vec![ContentItem::text(failure.render())],
                failure.request_id,
                failure.raw,
            ));
            next.phase = ConvState::Idle;
            Ok(commit(next)
                .with_effect(Effect::Notify(Notification::ApiError))
                .with_effect(Effect::Publish))
        }

        // ============================================================
        // Reset and model selection
        // ============================================================
        Event::Reset => {
            ensure_idle(state)?;
            Ok(commit(state.cleared())
                .with_effect(Effect::Publish)
                .with_effect(Effect::Cleared))
        }

        Event::SelectModel { path } => {
            if !context.knows_model(&path) {
                return Err(TransitionError::UnknownSemanticModel(path));
            }
            if path == state.semantic_model {
                return Ok(TransitionResult::unchanged(state));
            }
            ensure_idle(state)?;
            let mut next = state.cleared();
            next.semantic_model = path;
            Ok(commit(next)
                .with_effect(Effect::Publish)
                .with_effect(Effect::Cleared))
        }

        // ============================================================
        // Feedback
        // ============================================================
        Event::FeedbackRequested {
            request_id,
            positive,
            message,
        } => {
            if !state.has_analyst_request(&request_id) {
                return Err(TransitionError::UnknownRequest(request_id));
            }
            if state.feedback.contains_key(&request_id) {
                return Err(TransitionError::FeedbackAlreadySubmitted(request_id));
            }
            let mut next = state.clone();
            next.feedback
                .insert(request_id.clone(), FeedbackRecord::Pending);
            Ok(commit(next)
                .with_effect(Effect::Publish)
                .with_effect(Effect::submit_feedback(request_id, positive, message)))
        }

        // Completions for records that no longer exist (reset while in
        // flight) are dropped
        Event::FeedbackCompleted { request_id, error } => {
            if state.feedback.get(&request_id) != Some(&FeedbackRecord::Pending) {
                return Ok(TransitionResult::unchanged(state));
            }
            let record = match error {
                None => FeedbackRecord::Submitted,
                Some(error) => FeedbackRecord::Failed { error },
            };
            let mut next = state.clone();
            next.feedback.insert(request_id, record);
            Ok(commit(next).with_effect(Effect::Publish))
        }

        // ============================================================
        // Charts
        // ============================================================
        Event::ChartSelected {
            message_index,
            selection,
        } => {
            let Some(message) = state.messages.get(message_index) else {
                return Err(TransitionError::InvalidChartSelection(format!(
                    "no message at index {message_index}"
                )));
            };
            if !message.has_sql() {
                return Err(TransitionError::InvalidChartSelection(format!(
                    "message {message_index} has no query results"
                )));
            }
            if selection.x == selection.y {
                return Err(TransitionError::InvalidChartSelection(
                    "x and y axis must differ".to_string(),
                ));
            }
            let mut next = state.clone();
            next.chart_selections.insert(message_index, selection);
            Ok(commit(next).with_effect(Effect::Publish))
        }
    }
}

// Helper functions

fn ensure_idle(state: &ConversationState) -> Result<(), TransitionError> {
    if state.is_busy() {
        Err(TransitionError::Busy)
    } else {
        Ok(())
    }
}

fn ensure_awaiting(state: &ConversationState, event: &str) -> Result<(), TransitionError> {
    if state.is_busy() {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition(format!(
            "{event} while {}",
            state.phase.as_str()
        )))
    }
}

fn commit(mut next: ConversationState) -> TransitionResult {
    next.version += 1;
    TransitionResult::new(next)
}

/// Clear warnings, append the user turn and ask the analyst
fn start_turn(
    mut next: ConversationState,
    context: &ConvContext,
    text: String,
) -> Result<TransitionResult, TransitionError> {
    if text.trim().is_empty() {
        return Err(TransitionError::EmptyMessage);
    }
    next.warnings.clear();
    next.messages.push(Message::user(text));
    next.phase = ConvState::AwaitingResponse;

    let request = MessageRequest {
        messages: history_window(&next.messages, context.history_window)
            .iter()
            .map(Message::to_wire)
            .collect(),
        semantic_model_file: next.semantic_model.clone(),
    };

    Ok(commit(next)
        .with_effect(Effect::Publish)
        .with_effect(Effect::RequestAnalyst { request }))
}

/// Messages to resend. With a window, the slice is widened backwards until
/// it starts at a user message, since the analyst expects user-first order.
pub fn history_window(messages: &[Message], window: Option<usize>) -> &[Message] {
    let Some(limit) = window else {
        return messages;
    };
    let limit = limit.max(1);
    if messages.len() <= limit {
        return messages;
    }
    let mut start = messages.len() - limit;
    while start > 0 && messages[start].role != Role::User {
        start -= 1;
    }
    &messages[start..]
}
