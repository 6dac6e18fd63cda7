//! Job trigger endpoints
//!
//! POST /jobs/reviews/poll and POST /jobs/responses/post run one cycle of
//! the ingestion coordinator / response poster. Both return 202 Accepted
//! immediately and do the work in a background task, mirroring the
//! periodic pollers.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;

use crate::AppState;

/// POST /jobs/reviews/poll
pub async fn trigger_review_poll(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let ingestion = state.ingestion.clone();
    let last_error = state.last_error.clone();

    tokio::spawn(async move {
        if let Err(e) = ingestion.run_cycle().await {
            tracing::error!(error = %e, "Triggered ingestion cycle failed");
            *last_error.write().await = Some(e.to_string());
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// POST /jobs/responses/post
pub async fn trigger_response_post(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let poster = state.poster.clone();
    let last_error = state.last_error.clone();

    tokio::spawn(async move {
        if let Err(e) = poster.run_sweep().await {
            tracing::error!(error = %e, "Triggered posting sweep failed");
            *last_error.write().await = Some(e.to_string());
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// Build job trigger routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/reviews/poll", post(trigger_review_poll))
        .route("/jobs/responses/post", post(trigger_response_post))
}
