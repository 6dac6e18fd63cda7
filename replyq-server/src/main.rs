//! replyq-server - Review Reply Workflow Service
//!
//! Ingests third-party customer reviews, classifies them, drafts replies,
//! routes approval to the business owner over SMS, and reconciles approved
//! replies back to the originating platform.

use anyhow::Result;
use replyq_common::config;
use replyq_common::events::EventBus;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use replyq_server::services::{
    billing::HttpBillingPortal, gateway::HttpSmsGateway, generator::HttpReplyGenerator,
    platform::HttpPlatformPoster, sources::HttpReviewSource, ConversationStateMachine,
    IngestionCoordinator, NotificationDispatcher, ResponsePoster, RetryScheduler,
};
use replyq_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with env-filter (RUST_LOG) and an info default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting replyq-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Configuration: TOML + REPLYQ_* env overrides. A production config
    // without a webhook secret fails here rather than starting insecurely.
    let cfg = config::load_config(None).map_err(|e| anyhow::anyhow!("{}", e))?;

    let db_path = config::resolve_database_path(&cfg);
    info!("Database: {}", db_path.display());

    let db_pool = replyq_common::db::init_database(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    // Collaborator clients from config; missing credentials are allowed at
    // startup (sends fail and land in the retry paths) but are worth a
    // loud warning
    let sms_cfg = &cfg.sms;
    if sms_cfg.auth_token.is_none() {
        warn!("SMS gateway auth token not configured; owner alerts will fail until it is set");
    }
    let gateway = Arc::new(
        HttpSmsGateway::new(
            sms_cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://sms.gateway.example".to_string()),
            sms_cfg.account_id.clone().unwrap_or_default(),
            sms_cfg.auth_token.clone().unwrap_or_default(),
            sms_cfg.from_number.clone().unwrap_or_default(),
        )
        .map_err(|e| anyhow::anyhow!("SMS gateway init failed: {}", e))?,
    );

    let source_client = Arc::new(
        HttpReviewSource::new(
            cfg.sources
                .base_url
                .clone()
                .unwrap_or_else(|| "https://reviews.aggregator.example".to_string()),
            cfg.sources.api_key.clone().unwrap_or_default(),
        )
        .map_err(|e| anyhow::anyhow!("Review source client init failed: {}", e))?,
    );

    let generator = Arc::new(
        HttpReplyGenerator::new(
            cfg.generator
                .base_url
                .clone()
                .unwrap_or_else(|| "https://replies.generator.example".to_string()),
            cfg.generator.api_key.clone().unwrap_or_default(),
        )
        .map_err(|e| anyhow::anyhow!("Reply generator client init failed: {}", e))?,
    );

    let platform_poster = Arc::new(
        HttpPlatformPoster::new(
            cfg.sources
                .base_url
                .clone()
                .unwrap_or_else(|| "https://reviews.aggregator.example".to_string()),
            cfg.sources.api_key.clone().unwrap_or_default(),
        )
        .map_err(|e| anyhow::anyhow!("Platform poster client init failed: {}", e))?,
    );

    let billing = Arc::new(
        HttpBillingPortal::new(
            cfg.billing
                .base_url
                .clone()
                .unwrap_or_else(|| "https://billing.portal.example".to_string()),
            cfg.billing.api_key.clone().unwrap_or_default(),
        )
        .map_err(|e| anyhow::anyhow!("Billing client init failed: {}", e))?,
    );

    // Services wired with explicit dependency injection
    let notifier = Arc::new(NotificationDispatcher::new(
        db_pool.clone(),
        event_bus.clone(),
        gateway,
    ));
    let ingestion = Arc::new(IngestionCoordinator::new(
        db_pool.clone(),
        event_bus.clone(),
        source_client,
        generator,
        notifier.clone(),
    ));
    let retry = Arc::new(RetryScheduler::new(
        db_pool.clone(),
        event_bus.clone(),
        notifier,
    ));
    let poster = Arc::new(ResponsePoster::new(
        db_pool.clone(),
        event_bus.clone(),
        platform_poster,
    ));
    let conversation = Arc::new(ConversationStateMachine::new(
        db_pool.clone(),
        event_bus.clone(),
        billing,
    ));

    let state = AppState::new(
        db_pool,
        event_bus,
        conversation,
        ingestion,
        poster,
        retry,
        cfg.webhook_secret.clone(),
    );

    // Background pollers: ingestion, retry sweep, posting sweep
    replyq_server::poller::spawn_pollers(state.clone());
    info!("Background pollers started");

    let app = replyq_server::build_router(state);

    let bind_address = config::resolve_bind_address(&cfg);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
