//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChartRequest, ChatRequest, CreateSessionRequest, ErrorResponse, FeedbackRequest,
    ModelsResponse, QueuedResponse, SelectModelRequest, SessionResponse, SuccessResponse,
};
use super::AppState;
use crate::presentation::{ConversationView, ModelOption, Renderer};
use crate::runtime::{SessionError, SessionHandle};
use crate::state_machine::{ChartSelection, Event, TransitionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Semantic models
        .route("/api/models", get(list_models))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_view).delete(delete_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User actions
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/suggestion", post(select_suggestion))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/model", post(select_model))
        .route("/api/sessions/:id/feedback", post(submit_feedback))
        .route("/api/sessions/:id/chart", post(select_chart))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Models
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let settings = state.sessions.settings();
    Json(ModelsResponse {
        models: settings
            .semantic_models
            .iter()
            .map(|path| ModelOption::new(path))
            .collect(),
        default: settings.default_semantic_model().to_string(),
    })
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let handle = state.sessions.create(request.semantic_model).await?;
    tracing::info!(session_id = %handle.id, "Session created");

    Ok(Json(SessionResponse {
        semantic_model: handle.snapshot().semantic_model,
        session_id: handle.id,
    }))
}

/// Composed view. Drains the session's pending notifications.
async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let snapshot = handle.snapshot();
    let notifications = handle.drain_notifications();

    let renderer = Renderer {
        queries: &state.queries,
        summaries: &state.summaries,
    };
    let view = renderer
        .render(
            &handle.id,
            &snapshot,
            &handle.context.semantic_models,
            notifications,
        )
        .await;
    Ok(Json(view))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.sessions.remove(&id).await {
        return Err(AppError::NotFound(format!("Session not found: {id}")));
    }
    tracing::info!(session_id = %id, "Session removed");
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(&id).await?;
    // Subscribe before reading the snapshot so no change falls in between
    let broadcast_rx = handle.subscribe();
    Ok(sse_stream(&handle.snapshot(), broadcast_rx))
}

// ============================================================
// User Actions
// ============================================================

async fn queue(state: &AppState, id: &str, event: Event) -> Result<Json<QueuedResponse>, AppError> {
    let handle: SessionHandle = state.sessions.get(id).await?;
    handle.send(event).await?;
    Ok(Json(QueuedResponse { queued: true }))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    queue(&state, &id, Event::UserTurn { text: req.text }).await
}

async fn select_suggestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    queue(&state, &id, Event::SuggestionSelected { text: req.text }).await
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, AppError> {
    queue(&state, &id, Event::Reset).await
}

async fn select_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SelectModelRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    queue(&state, &id, Event::SelectModel { path: req.path }).await
}

async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    let event = Event::FeedbackRequested {
        request_id: req.request_id,
        positive: req.positive,
        message: req.message,
    };
    queue(&state, &id, event).await
}

async fn select_chart(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChartRequest>,
) -> Result<Json<QueuedResponse>, AppError> {
    let event = Event::ChartSelected {
        message_index: req.message_index,
        selection: ChartSelection {
            x: req.x,
            y: req.y,
            kind: req.kind,
        },
    };
    queue(&state, &id, event).await
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("cortex-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Rejected(
                TransitionError::Busy | TransitionError::FeedbackAlreadySubmitted(_),
            ) => AppError::Conflict(e.to_string()),
            SessionError::Rejected(_) => AppError::BadRequest(e.to_string()),
            SessionError::Closed => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
