//! Cortex Analyst chat server
//!
//! Conversational front end for Snowflake Cortex Analyst: questions go to
//! the analyst, generated SQL runs against the warehouse, and results come
//! back with charts and summaries.

mod api;
mod config;
mod gateway;
mod presentation;
mod runtime;
mod state_machine;
mod summarize;
mod warehouse;

use api::{create_router, AppState};
use config::AppConfig;
use gateway::{AnalystGateway, CortexAnalyst, LoggingGateway, SnowflakeRestClient};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use summarize::Summarizer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warehouse::{QueryCache, SqlApiWarehouse, StatementContext, Warehouse};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cortex_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        account = %config.snowflake.account_url,
        semantic_models = ?config.session.semantic_models,
        history_window = ?config.session.history_window,
        idle_secs = config.session.idle_timeout.as_secs(),
        complete_model = %config.complete_model,
        "Configuration loaded"
    );

    // Snowflake clients
    let rest = Arc::new(SnowflakeRestClient::new(&config.snowflake)?);
    let analyst: Arc<dyn AnalystGateway> = Arc::new(LoggingGateway::new(Arc::new(
        CortexAnalyst::new(rest.clone()),
    )));
    let warehouse: Arc<dyn Warehouse> = Arc::new(SqlApiWarehouse::new(
        rest,
        StatementContext::from(&config.snowflake),
    ));

    // Create application state
    let state = AppState::new(
        SessionManager::new(analyst, config.session.clone()),
        QueryCache::new(warehouse.clone()),
        Summarizer::new(warehouse, config.complete_model.clone()),
    );
    let _sweep = state.sessions.spawn_idle_sweep();

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Cortex Analyst chat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
