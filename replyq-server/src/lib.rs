//! replyq-server library interface
//!
//! Exposes application state, the router builder, and all domain modules
//! for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod poller;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use replyq_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::{
    ConversationStateMachine, IngestionCoordinator, ResponsePoster, RetryScheduler,
};

/// Application state shared across handlers and pollers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// SMS conversation processor
    pub conversation: Arc<ConversationStateMachine>,
    /// Review ingestion pipeline
    pub ingestion: Arc<IngestionCoordinator>,
    /// Approved-draft reconciler
    pub poster: Arc<ResponsePoster>,
    /// Failed-alert retry sweep
    pub retry: Arc<RetryScheduler>,
    /// Shared secret expected on inbound webhooks, when configured
    pub webhook_secret: Option<String>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        conversation: Arc<ConversationStateMachine>,
        ingestion: Arc<IngestionCoordinator>,
        poster: Arc<ResponsePoster>,
        retry: Arc<RetryScheduler>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            db,
            event_bus,
            conversation,
            ingestion,
            poster,
            retry,
            webhook_secret,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::job_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
