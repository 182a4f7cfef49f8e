//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::SessionHandle;
use crate::gateway::{
    AnalystFailure, AnalystGateway, AnalystReply, ContentItem, FeedbackRequest, MessageRequest,
};
use crate::state_machine::ConversationState;
use crate::warehouse::{Table, Warehouse, WarehouseError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Analyst Gateway
// ============================================================================

/// Mock gateway that returns queued replies
pub struct MockGateway {
    replies: Mutex<VecDeque<Result<AnalystReply, AnalystFailure>>>,
    feedback_results: Mutex<VecDeque<Option<String>>>,
    /// When set, each message call waits for one `release`
    gate: Option<Arc<Notify>>,
    /// Record of all message requests made
    pub requests: Mutex<Vec<MessageRequest>>,
    /// Record of all feedback submitted
    pub feedback: Mutex<Vec<FeedbackRequest>>,
}

#[allow(dead_code)]
impl MockGateway {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            feedback_results: Mutex::new(VecDeque::new()),
            gate: None,
            requests: Mutex::new(Vec::new()),
            feedback: Mutex::new(Vec::new()),
        }
    }

    /// Message calls block until `release` is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::new()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Queue a reply with the given content
    pub fn queue_reply(&self, request_id: &str, content: Vec<ContentItem>) {
        self.replies.lock().unwrap().push_back(Ok(AnalystReply {
            content,
            request_id: request_id.to_string(),
            warnings: None,
            raw: serde_json::json!({ "request_id": request_id }),
        }));
    }

    pub fn queue_failure(&self, failure: AnalystFailure) {
        self.replies.lock().unwrap().push_back(Err(failure));
    }

    /// Queue the outcome of the next feedback call; unqueued calls succeed
    pub fn queue_feedback_result(&self, error: Option<String>) {
        self.feedback_results.lock().unwrap().push_back(error);
    }

    pub fn recorded_requests(&self) -> Vec<MessageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn recorded_feedback(&self) -> Vec<FeedbackRequest> {
        self.feedback.lock().unwrap().clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalystGateway for MockGateway {
    async fn send_message(&self, request: &MessageRequest) -> Result<AnalystReply, AnalystFailure> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalystFailure::from_transport("No mock reply queued", None)))
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Option<String> {
        self.feedback.lock().unwrap().push(request.clone());
        self.feedback_results.lock().unwrap().pop_front().flatten()
    }
}

// ============================================================================
// Mock Warehouse
// ============================================================================

/// Mock warehouse serving fixed tables by exact SQL text
pub struct MockWarehouse {
    tables: Mutex<HashMap<String, Table>>,
    /// Returned, in order, before any table lookup
    failures: Mutex<VecDeque<WarehouseError>>,
    queries: Mutex<Vec<(String, Vec<String>)>>,
}

#[allow(dead_code)]
impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// The next query fails with `error`, whatever its text
    pub fn fail_next(&self, error: WarehouseError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn insert(&self, sql: impl Into<String>, table: Table) {
        self.tables.lock().unwrap().insert(sql.into(), table);
    }

    pub fn call_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn recorded_queries(&self) -> Vec<(String, Vec<String>)> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn query(&self, sql: &str, bindings: &[String]) -> Result<Table, WarehouseError> {
        self.queries
            .lock()
            .unwrap()
            .push((sql.to_string(), bindings.to_vec()));
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.tables
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| WarehouseError::Statement {
                code: "002003".to_string(),
                message: format!("Object does not exist: {sql}"),
            })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Wait until the published state satisfies `pred`
pub async fn wait_for_state(
    handle: &SessionHandle,
    pred: impl FnMut(&ConversationState) -> bool,
) -> ConversationState {
    let mut rx = handle.snapshot_rx.clone();
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("runtime stopped");
    state.clone()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::runtime::{SessionError, SessionEvent, SessionManager};
    use crate::state_machine::{ConvState, Event, FeedbackRecord, Notification, TransitionError};
    use crate::gateway::Role;
    use serde_json::json;

    const MODEL_A: &str = "@DB.S.M/a.yaml";
    const MODEL_B: &str = "@DB.S.M/b.yaml";

    fn settings(opening_question: Option<&str>) -> SessionSettings {
        SessionSettings {
            semantic_models: vec![MODEL_A.to_string(), MODEL_B.to_string()],
            history_window: None,
            opening_question: opening_question.map(String::from),
            idle_timeout: Duration::from_secs(3600),
        }
    }

    fn manager(gateway: Arc<MockGateway>, opening_question: Option<&str>) -> SessionManager {
        SessionManager::new(gateway, settings(opening_question))
    }

    fn idle_with(len: usize) -> impl FnMut(&ConversationState) -> bool {
        move |s| s.phase == ConvState::Idle && s.messages.len() == len
    }

    #[tokio::test]
    async fn test_mock_gateway() {
        let mock = MockGateway::new();
        mock.queue_reply("r1", vec![ContentItem::text("Hello")]);
        let request = MessageRequest {
            messages: vec![],
            semantic_model_file: MODEL_A.into(),
        };

        let reply = mock.send_message(&request).await.unwrap();
        assert_eq!(reply.request_id, "r1");

        // Second call should fail (no more replies)
        assert!(mock.send_message(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_opening_question_asked_on_create() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply("r0", vec![ContentItem::text("You can ask about tweets.")]);
        let sessions = manager(gateway.clone(), Some("What questions can I ask?"));

        let handle = sessions.create(None).await.unwrap();
        let state = wait_for_state(&handle, idle_with(2)).await;

        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[0].content, vec![ContentItem::text("What questions can I ask?")]);
        assert_eq!(state.messages[1].request_id.as_deref(), Some("r0"));
        assert_eq!(gateway.recorded_requests()[0].semantic_model_file, MODEL_A);
    }

    #[tokio::test]
    async fn test_user_turn_sends_full_history() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply("r1", vec![ContentItem::text("a1")]);
        gateway.queue_reply("r2", vec![ContentItem::sql("SELECT 2")]);
        let sessions = manager(gateway.clone(), None);
        let handle = sessions.create(Some(MODEL_B.into())).await.unwrap();

        handle.send(Event::UserTurn { text: "q1".into() }).await.unwrap();
        wait_for_state(&handle, idle_with(2)).await;
        handle.send(Event::UserTurn { text: "q2".into() }).await.unwrap();
        let state = wait_for_state(&handle, idle_with(4)).await;

        assert!(state.messages[3].has_sql());
        let requests = gateway.recorded_requests();
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].semantic_model_file, MODEL_B);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_input() {
        let gateway = Arc::new(MockGateway::gated());
        gateway.queue_reply("r1", vec![ContentItem::text("a1")]);
        let sessions = manager(gateway.clone(), None);
        let handle = sessions.create(None).await.unwrap();

        handle.send(Event::UserTurn { text: "q1".into() }).await.unwrap();
        wait_for_state(&handle, |s| s.is_busy()).await;

        for event in [Event::UserTurn { text: "q2".into() }, Event::Reset] {
            assert!(matches!(
                handle.send(event).await,
                Err(SessionError::Rejected(TransitionError::Busy))
            ));
        }

        gateway.release();
        wait_for_state(&handle, idle_with(2)).await;
        assert_eq!(gateway.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_queues_one_notification() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_failure(AnalystFailure::from_api(
            404,
            json!({ "request_id": "abc", "error_code": "E1", "message": "bad model" }),
        ));
        let sessions = manager(gateway, None);
        let handle = sessions.create(None).await.unwrap();
        let mut events = handle.subscribe();

        handle.send(Event::UserTurn { text: "q".into() }).await.unwrap();
        let state = wait_for_state(&handle, idle_with(2)).await;
        assert_eq!(state.messages[1].request_id.as_deref(), Some("abc"));

        assert_eq!(handle.drain_notifications(), vec![Notification::ApiError]);
        assert!(handle.drain_notifications().is_empty());

        let mut saw_notification = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::Notification { .. }) {
                saw_notification = true;
            }
        }
        assert!(saw_notification);
    }

    #[tokio::test]
    async fn test_reset_reasks_opening_question() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply("r0", vec![ContentItem::text("intro")]);
        gateway.queue_reply("r1", vec![ContentItem::text("a1")]);
        gateway.queue_reply("r2", vec![ContentItem::text("intro again")]);
        let sessions = manager(gateway.clone(), Some("What questions can I ask?"));
        let handle = sessions.create(None).await.unwrap();

        wait_for_state(&handle, idle_with(2)).await;
        handle.send(Event::UserTurn { text: "q1".into() }).await.unwrap();
        wait_for_state(&handle, idle_with(4)).await;

        handle.send(Event::Reset).await.unwrap();
        let state = wait_for_state(&handle, |s| {
            s.phase == ConvState::Idle
                && s.messages.len() == 2
                && s.messages[1].request_id.as_deref() == Some("r2")
        })
        .await;
        assert_eq!(state.messages[0].content, vec![ContentItem::text("What questions can I ask?")]);
        // The history sent after reset starts fresh
        assert_eq!(gateway.recorded_requests()[2].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_suggestion_becomes_user_turn() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply(
            "r1",
            vec![ContentItem::Suggestions {
                suggestions: vec!["Top 5 days?".into(), "Latency trend?".into()],
            }],
        );
        gateway.queue_reply("r2", vec![ContentItem::sql("SELECT 5")]);
        let sessions = manager(gateway.clone(), None);
        let handle = sessions.create(None).await.unwrap();

        handle.send(Event::UserTurn { text: "hmm".into() }).await.unwrap();
        wait_for_state(&handle, idle_with(2)).await;
        handle
            .send(Event::SuggestionSelected { text: "Latency trend?".into() })
            .await
            .unwrap();
        let state = wait_for_state(&handle, idle_with(4)).await;

        assert_eq!(state.messages[2].content, vec![ContentItem::text("Latency trend?")]);
        assert_eq!(state.active_suggestion, None);
    }

    #[tokio::test]
    async fn test_feedback_records_outcome() {
        let gateway = Arc::new(MockGateway::new());
        gateway.queue_reply("r1", vec![ContentItem::text("a1")]);
        gateway.queue_reply("r2", vec![ContentItem::text("a2")]);
        gateway.queue_feedback_result(None);
        gateway.queue_feedback_result(Some("403 forbidden".into()));
        let sessions = manager(gateway.clone(), None);
        let handle = sessions.create(None).await.unwrap();

        for (i, text) in ["q1", "q2"].into_iter().enumerate() {
            handle.send(Event::UserTurn { text: text.into() }).await.unwrap();
            wait_for_state(&handle, idle_with(2 * (i + 1))).await;
        }

        handle
            .send(Event::FeedbackRequested {
                request_id: "r1".into(),
                positive: true,
                message: String::new(),
            })
            .await
            .unwrap();
        handle
            .send(Event::FeedbackRequested {
                request_id: "r2".into(),
                positive: false,
                message: "wrong".into(),
            })
            .await
            .unwrap();

        let state = wait_for_state(&handle, |s| {
            s.feedback.values().all(|r| *r != FeedbackRecord::Pending) && s.feedback.len() == 2
        })
        .await;
        assert_eq!(state.feedback["r1"], FeedbackRecord::Submitted);
        assert_eq!(
            state.feedback["r2"],
            FeedbackRecord::Failed { error: "403 forbidden".into() }
        );
        assert_eq!(gateway.recorded_feedback().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_model_and_session() {
        let sessions = manager(Arc::new(MockGateway::new()), None);
        assert!(matches!(
            sessions.create(Some("@X/y.yaml".into())).await,
            Err(SessionError::Rejected(TransitionError::UnknownSemanticModel(_)))
        ));
        assert!(matches!(
            sessions.get("missing").await,
            Err(SessionError::NotFound(_))
        ));

        let handle = sessions.create(None).await.unwrap();
        assert_eq!(sessions.len().await, 1);
        assert!(sessions.remove(&handle.id).await);
        assert!(!sessions.remove(&handle.id).await);
    }

    #[tokio::test]
    async fn test_idle_sessions_without_streams_are_evicted() {
        let sessions = SessionManager::new(
            Arc::new(MockGateway::new()),
            SessionSettings {
                idle_timeout: Duration::from_millis(30),
                ..settings(None)
            },
        );
        let idle = sessions.create(None).await.unwrap().id;
        let watched = sessions.create(None).await.unwrap();
        let _stream = watched.subscribe();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let fresh = sessions.create(None).await.unwrap().id;

        assert_eq!(sessions.evict_idle().await, 1);
        assert!(matches!(
            sessions.get(&idle).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(sessions.get(&watched.id).await.is_ok());
        assert!(sessions.get(&fresh).await.is_ok());
        assert_eq!(sessions.len().await, 2);
    }

    #[tokio::test]
    async fn test_lookup_counts_as_activity() {
        let sessions = SessionManager::new(
            Arc::new(MockGateway::new()),
            SessionSettings {
                idle_timeout: Duration::from_millis(200),
                ..settings(None)
            },
        );
        let id = sessions.create(None).await.unwrap().id;

        tokio::time::sleep(Duration::from_millis(150)).await;
        sessions.get(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(sessions.evict_idle().await, 0);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_idle_sweep_stops_runtime() {
        let gateway = Arc::new(MockGateway::new());
        let sessions = Arc::new(SessionManager::new(
            gateway,
            SessionSettings {
                idle_timeout: Duration::from_millis(20),
                ..settings(None)
            },
        ));
        let handle = sessions.create(None).await.unwrap();
        let mut snapshots = handle.snapshot_rx.clone();
        drop(handle);

        let sweep = sessions.spawn_idle_sweep();
        tokio::time::timeout(Duration::from_secs(2), async {
            while sessions.len().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session was never evicted");

        // Sender side lives in the runtime task, so this resolves once it ends
        tokio::time::timeout(Duration::from_secs(2), async {
            while snapshots.changed().await.is_ok() {}
        })
        .await
        .expect("runtime kept running");

        drop(sessions);
        tokio::time::timeout(Duration::from_secs(2), sweep)
            .await
            .expect("sweep kept running")
            .unwrap();
    }
}
