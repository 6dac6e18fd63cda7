//! Periodic background pollers
//!
//! One loop each for review ingestion, notification retries, and response
//! posting. Intervals are re-read from settings every cycle so operators
//! can tune cadence without a restart. Each loop records its last failure
//! on the shared diagnostics slot instead of dying.

use crate::db;
use crate::AppState;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_SECS: i64 = 300;
const DEFAULT_RETRY_SWEEP_INTERVAL_SECS: i64 = 60;
const DEFAULT_POST_SWEEP_INTERVAL_SECS: i64 = 120;

/// Spawn all three poller loops
pub fn spawn_pollers(state: AppState) {
    tokio::spawn(ingestion_loop(state.clone()));
    tokio::spawn(retry_loop(state.clone()));
    tokio::spawn(posting_loop(state));
}

async fn ingestion_loop(state: AppState) {
    loop {
        let interval = read_interval(
            &state,
            "review_poll_interval_secs",
            DEFAULT_POLL_INTERVAL_SECS,
        )
        .await;
        tokio::time::sleep(interval).await;

        if let Err(e) = state.ingestion.run_cycle().await {
            tracing::error!(error = %e, "Ingestion cycle failed");
            *state.last_error.write().await = Some(e.to_string());
        }
    }
}

async fn retry_loop(state: AppState) {
    loop {
        let interval = read_interval(
            &state,
            "retry_sweep_interval_secs",
            DEFAULT_RETRY_SWEEP_INTERVAL_SECS,
        )
        .await;
        tokio::time::sleep(interval).await;

        if let Err(e) = state.retry.run_sweep().await {
            tracing::error!(error = %e, "Notification retry sweep failed");
            *state.last_error.write().await = Some(e.to_string());
        }
    }
}

async fn posting_loop(state: AppState) {
    loop {
        let interval = read_interval(
            &state,
            "post_sweep_interval_secs",
            DEFAULT_POST_SWEEP_INTERVAL_SECS,
        )
        .await;
        tokio::time::sleep(interval).await;

        if let Err(e) = state.poster.run_sweep().await {
            tracing::error!(error = %e, "Response posting sweep failed");
            *state.last_error.write().await = Some(e.to_string());
        }
    }
}

async fn read_interval(state: &AppState, key: &str, default_secs: i64) -> Duration {
    let secs = db::settings::get_i64(&state.db, key, default_secs)
        .await
        .unwrap_or(default_secs)
        .max(1);
    Duration::from_secs(secs as u64)
}
