//! HTTP API for the analyst chat
//!
//! Sessions, the composed view, user actions and an SSE change stream.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::SessionManager;
use crate::summarize::Summarizer;
use crate::warehouse::QueryCache;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// Process-wide, shared by every session
    pub queries: Arc<QueryCache>,
    pub summaries: Arc<Summarizer>,
}

impl AppState {
    pub fn new(sessions: SessionManager, queries: QueryCache, summaries: Summarizer) -> Self {
        Self {
            sessions: Arc::new(sessions),
            queries: Arc::new(queries),
            summaries: Arc::new(summaries),
        }
    }
}
