//! Runtime for executing conversations
//!
//! Each browser session gets one task that owns its `ConversationState`,
//! applies events through the pure transition function and carries out the
//! resulting effects. Everything outside the task sees read-only snapshots.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;

use crate::config::SessionSettings;
use crate::gateway::AnalystGateway;
use crate::state_machine::{
    transition, ConvContext, ConvState, ConversationState, Event, Notification, TransitionError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Upper bound on how often idle sessions are looked for
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Subscribers re-fetch the view; only the new version is carried
    StateChange { version: u64, phase: ConvState },
    Notification { notification: Notification },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session runtime has stopped")]
    Closed,
}

/// Notifications waiting for the next render, shared with the runtime task
pub(crate) type NotificationQueue = Arc<Mutex<VecDeque<Notification>>>;

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub context: Arc<ConvContext>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    snapshot_rx: watch::Receiver<ConversationState>,
    notifications: NotificationQueue,
    last_active: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    /// Validate `event` against the current snapshot, then queue it.
    ///
    /// The runtime applies it again on the authoritative state, so an event
    /// that raced with another one is still rejected there.
    pub async fn send(&self, event: Event) -> Result<(), SessionError> {
        transition(&self.snapshot(), &self.context, event.clone())?;
        self.event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub fn snapshot(&self) -> ConversationState {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Take every pending notification. Each one is shown exactly once.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Nothing touched it within `timeout` and no stream is attached
    fn is_abandoned(&self, timeout: Duration) -> bool {
        self.broadcast_tx.receiver_count() == 0 && self.idle_for() >= timeout
    }
}

/// Manager for all session runtimes
pub struct SessionManager {
    gateway: Arc<dyn AnalystGateway>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn AnalystGateway>, settings: SessionSettings) -> Self {
        Self {
            gateway,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Start a new session on `semantic_model`, or the default model
    pub async fn create(
        &self,
        semantic_model: Option<String>,
    ) -> Result<SessionHandle, SessionError> {
        let model =
            semantic_model.unwrap_or_else(|| self.settings.default_semantic_model().to_string());
        let id = uuid::Uuid::new_v4().to_string();
        let context = ConvContext::new(&id, self.settings.semantic_models.clone())
            .with_history_window(self.settings.history_window);
        if !context.knows_model(&model) {
            return Err(TransitionError::UnknownSemanticModel(model).into());
        }

        let state = ConversationState::new(model);
        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(128);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.clone());
        let notifications = NotificationQueue::default();

        let runtime = SessionRuntime::new(
            context.clone(),
            state,
            self.gateway.clone(),
            event_rx,
            broadcast_tx.clone(),
            snapshot_tx,
            notifications.clone(),
        )
        .with_opening_question(self.settings.opening_question.clone());

        let session_id = id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %session_id, "Session runtime finished");
        });

        let handle = SessionHandle {
            id: id.clone(),
            context: Arc::new(context),
            event_tx,
            broadcast_tx,
            snapshot_rx,
            notifications,
            last_active: Arc::new(Mutex::new(Instant::now())),
        };
        self.sessions.write().await.insert(id, handle.clone());
        Ok(handle)
    }

    /// Look up a session. Counts as activity for idle eviction.
    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.touch();
        Ok(handle)
    }

    /// Forget a session. Its runtime stops once the last handle is dropped.
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Drop sessions idle past `idle_timeout` with no stream attached.
    /// Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let timeout = self.settings.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let abandoned = handle.is_abandoned(timeout);
            if abandoned {
                tracing::info!(
                    session_id = %id,
                    idle_secs = handle.idle_for().as_secs(),
                    "Evicting idle session"
                );
            }
            !abandoned
        });
        before - sessions.len()
    }

    /// Periodically evict idle sessions until the manager is dropped
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.idle_timeout.min(SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let evicted = manager.evict_idle().await;
                if evicted > 0 {
                    tracing::debug!(evicted, "Idle session sweep");
                }
            }
        })
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
