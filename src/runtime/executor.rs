//! Session runtime executor

use super::{NotificationQueue, SessionEvent};
use crate::gateway::AnalystGateway;
use crate::state_machine::{transition, ConvContext, ConversationState, Effect, Event};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};

/// Owns one session's state. Generic over the gateway so tests can drive it
/// with a mock.
pub struct SessionRuntime<G>
where
    G: AnalystGateway + 'static,
{
    context: ConvContext,
    state: ConversationState,
    gateway: Arc<G>,
    /// Asked on start and after every reset while configured
    opening_question: Option<String>,
    event_rx: mpsc::Receiver<Event>,
    /// Gateway completions re-enter the loop through this channel
    completion_tx: mpsc::Sender<Event>,
    completion_rx: mpsc::Receiver<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    snapshot_tx: watch::Sender<ConversationState>,
    notifications: NotificationQueue,
}

impl<G> SessionRuntime<G>
where
    G: AnalystGateway + 'static,
{
    pub(crate) fn new(
        context: ConvContext,
        state: ConversationState,
        gateway: G,
        event_rx: mpsc::Receiver<Event>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
        snapshot_tx: watch::Sender<ConversationState>,
        notifications: NotificationQueue,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(8);
        Self {
            context,
            state,
            gateway: Arc::new(gateway),
            opening_question: None,
            event_rx,
            completion_tx,
            completion_rx,
            broadcast_tx,
            snapshot_tx,
            notifications,
        }
    }

    pub fn with_opening_question(mut self, question: Option<String>) -> Self {
        self.opening_question = question.filter(|q| !q.trim().is_empty());
        self
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.context.session_id,
            semantic_model = %self.state.semantic_model,
            "Starting session runtime"
        );

        if self.state.messages.is_empty() {
            if let Some(event) = self.opening_turn() {
                self.process_event(event);
            }
        }

        // Ends when every handle (and so every event sender) is gone
        loop {
            tokio::select! {
                event = self.event_rx.recv() => match event {
                    Some(event) => self.process_event(event),
                    None => break,
                },
                Some(event) = self.completion_rx.recv() => self.process_event(event),
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    /// Apply `event` and everything it triggers, in order
    fn process_event(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(current) = queue.pop_front() {
            let name = current.name();
            let result = match transition(&self.state, &self.context, current) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.context.session_id,
                        event = name,
                        error = %e,
                        "Event rejected"
                    );
                    let _ = self.broadcast_tx.send(SessionEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            tracing::debug!(
                session_id = %self.context.session_id,
                event = name,
                version = result.new_state.version,
                phase = result.new_state.phase.as_str(),
                "Transition applied"
            );
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect) {
                    queue.push_back(generated);
                }
            }
        }
    }

    /// Run one effect. Returns an event to apply immediately, if any.
    fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::RequestAnalyst { request } => {
                let gateway = self.gateway.clone();
                let tx = self.completion_tx.clone();
                tokio::spawn(async move {
                    let event = match gateway.send_message(&request).await {
                        Ok(reply) => Event::AnalystReplied { reply },
                        Err(failure) => Event::AnalystFailed { failure },
                    };
                    // Receiver gone means the session was dropped meanwhile
                    let _ = tx.send(event).await;
                });
                None
            }

            Effect::SubmitFeedback { request } => {
                let gateway = self.gateway.clone();
                let tx = self.completion_tx.clone();
                tokio::spawn(async move {
                    let error = gateway.send_feedback(&request).await;
                    let _ = tx
                        .send(Event::FeedbackCompleted {
                            request_id: request.request_id,
                            error,
                        })
                        .await;
                });
                None
            }

            Effect::ConsumeSuggestion => Some(Event::SuggestionConsumed),

            Effect::Cleared => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    semantic_model = %self.state.semantic_model,
                    "Conversation cleared"
                );
                self.opening_turn()
            }

            Effect::Notify(notification) => {
                self.notifications
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(notification);
                let _ = self
                    .broadcast_tx
                    .send(SessionEvent::Notification { notification });
                None
            }

            Effect::Publish => {
                self.snapshot_tx.send_replace(self.state.clone());
                let _ = self.broadcast_tx.send(SessionEvent::StateChange {
                    version: self.state.version,
                    phase: self.state.phase,
                });
                None
            }
        }
    }

    fn opening_turn(&self) -> Option<Event> {
        self.opening_question
            .clone()
            .map(|text| Event::UserTurn { text })
    }
}
