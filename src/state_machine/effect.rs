//! Effects produced by state transitions

use super::state::Notification;
use crate::gateway::{FeedbackRequest, MessageRequest};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the history to the analyst (awaited; answers with a gateway event)
    RequestAnalyst { request: MessageRequest },

    /// Act on the pending suggestion pointer
    ConsumeSuggestion,

    /// Send feedback for one reply
    SubmitFeedback { request: FeedbackRequest },

    /// Queue a one-shot notification for the next render
    Notify(Notification),

    /// History was emptied by a reset or model switch
    Cleared,

    /// Publish the new state version to subscribers
    Publish,
}

impl Effect {
    pub fn submit_feedback(
        request_id: impl Into<String>,
        positive: bool,
        message: impl Into<String>,
    ) -> Self {
        Effect::SubmitFeedback {
            request: FeedbackRequest {
                request_id: request_id.into(),
                positive,
                feedback_message: message.into(),
            },
        }
    }
}
