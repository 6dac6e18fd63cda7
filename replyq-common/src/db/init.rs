//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date.
//! All statements are idempotent (CREATE TABLE IF NOT EXISTS) so the function
//! is safe to call on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL mode allows concurrent readers while the pollers write
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Set busy timeout so webhook handlers and pollers contend gracefully
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes, and default settings (idempotent)
///
/// Exposed separately so tests can run the full schema against an
/// in-memory pool.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_businesses_table(pool).await?;
    create_review_sources_table(pool).await?;
    create_reviews_table(pool).await?;
    create_reply_drafts_table(pool).await?;
    create_conversation_contexts_table(pool).await?;
    create_notification_log_table(pool).await?;
    create_notification_retries_table(pool).await?;
    create_posted_responses_table(pool).await?;
    create_competitors_table(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

/// Create the settings table
///
/// Stores operational configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the businesses table
///
/// One row per subscribed business, including the owner phone that all
/// SMS conversation state is keyed against.
pub async fn create_businesses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS businesses (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_phone TEXT NOT NULL,
            auto_approve INTEGER NOT NULL DEFAULT 0,
            monitoring_paused INTEGER NOT NULL DEFAULT 0,
            sms_opt_out INTEGER NOT NULL DEFAULT 0,
            subscription_status TEXT NOT NULL DEFAULT 'active'
                CHECK (subscription_status IN ('active', 'past_due', 'cancelled')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_businesses_owner_phone ON businesses(owner_phone)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the review_sources table
///
/// One row per connected platform listing for a business.
pub async fn create_review_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_sources (
            guid TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(guid) ON DELETE CASCADE,
            platform TEXT NOT NULL CHECK (platform IN ('google', 'yelp', 'facebook')),
            external_source_id TEXT NOT NULL,
            credentials_status TEXT NOT NULL DEFAULT 'active'
                CHECK (credentials_status IN ('active', 'revoked')),
            last_polled_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (business_id, platform, external_source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_sources_business ON review_sources(business_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the reviews table
///
/// Immutable once created. The unique index on (platform, external_review_id)
/// is the race-condition backstop behind the pre-insert existence check.
pub async fn create_reviews_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            guid TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(guid) ON DELETE CASCADE,
            platform TEXT NOT NULL CHECK (platform IN ('google', 'yelp', 'facebook')),
            external_review_id TEXT NOT NULL,
            rating INTEGER NOT NULL CHECK (rating >= 1 AND rating <= 5),
            author_name TEXT,
            text TEXT NOT NULL,
            review_date TEXT NOT NULL,
            sentiment TEXT NOT NULL CHECK (sentiment IN ('positive', 'neutral', 'negative')),
            sentiment_score REAL NOT NULL CHECK (sentiment_score >= -1.0 AND sentiment_score <= 1.0),
            metadata TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (platform, external_review_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_business ON reviews(business_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_watermark ON reviews(business_id, platform, review_date)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the reply_drafts table
///
/// Always inserted in the same transaction as its review; a review must
/// never exist with zero drafts.
pub async fn create_reply_drafts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reply_drafts (
            guid TEXT PRIMARY KEY,
            review_id TEXT NOT NULL REFERENCES reviews(guid) ON DELETE CASCADE,
            text TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected', 'sent')),
            escalation INTEGER NOT NULL DEFAULT 0,
            escalation_reasons TEXT NOT NULL DEFAULT '[]',
            confidence REAL NOT NULL DEFAULT 0.0 CHECK (confidence >= 0.0 AND confidence <= 1.0),
            failure_detail TEXT,
            approved_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reply_drafts_review ON reply_drafts(review_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reply_drafts_status ON reply_drafts(status, approved_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the conversation_contexts table
///
/// One row per phone number, created lazily on first inbound SMS and
/// never deleted.
pub async fn create_conversation_contexts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_contexts (
            phone TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(guid) ON DELETE CASCADE,
            state TEXT NOT NULL DEFAULT 'idle'
                CHECK (state IN ('idle', 'awaiting_custom_reply', 'awaiting_cancel_confirm', 'awaiting_competitor_add')),
            pending_review_id TEXT REFERENCES reviews(guid),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the notification_log table
///
/// Append-only record of every inbound/outbound SMS. The gateway message id
/// is the inbound duplicate-delivery detection key.
pub async fn create_notification_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_log (
            guid TEXT PRIMARY KEY,
            direction TEXT NOT NULL CHECK (direction IN ('inbound', 'outbound')),
            phone TEXT NOT NULL,
            body TEXT NOT NULL,
            parsed_command TEXT,
            gateway_message_id TEXT,
            delivery_status TEXT NOT NULL DEFAULT 'queued'
                CHECK (delivery_status IN ('queued', 'sent', 'delivered', 'failed', 'received')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notification_log_gateway_id ON notification_log(gateway_message_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notification_log_phone ON notification_log(phone, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the notification_retries table
///
/// Dedicated retry-state record for failed review alerts, keyed by the
/// failed outbound notification_log entry.
pub async fn create_notification_retries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_retries (
            notification_id TEXT PRIMARY KEY REFERENCES notification_log(guid),
            review_id TEXT NOT NULL REFERENCES reviews(guid) ON DELETE CASCADE,
            attempt_count INTEGER NOT NULL DEFAULT 0 CHECK (attempt_count >= 0),
            next_attempt_at TEXT NOT NULL,
            terminal INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notification_retries_due ON notification_retries(terminal, next_attempt_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the posted_responses table
///
/// Exactly one row per successfully posted draft; its existence is the
/// idempotency guard for the response poster.
pub async fn create_posted_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posted_responses (
            guid TEXT PRIMARY KEY,
            draft_id TEXT NOT NULL UNIQUE REFERENCES reply_drafts(guid),
            review_id TEXT NOT NULL REFERENCES reviews(guid),
            platform TEXT NOT NULL CHECK (platform IN ('google', 'yelp', 'facebook')),
            platform_reply_id TEXT,
            posted_at TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posted_responses_review ON posted_responses(review_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the competitors table
///
/// Populated by the COMPETITOR ADD conversation flow.
pub async fn create_competitors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS competitors (
            guid TEXT PRIMARY KEY,
            business_id TEXT NOT NULL REFERENCES businesses(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (business_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values. NULL values are
/// reset to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Poller cadence
    ensure_setting(pool, "review_poll_interval_secs", "300").await?;
    ensure_setting(pool, "retry_sweep_interval_secs", "60").await?;
    ensure_setting(pool, "post_sweep_interval_secs", "120").await?;

    // Notification retry policy
    ensure_setting(pool, "retry_base_delay_secs", "300").await?;
    ensure_setting(pool, "retry_max_attempts", "3").await?;
    ensure_setting(pool, "retry_batch_size", "20").await?;

    // Response poster
    ensure_setting(pool, "post_batch_size", "10").await?;

    // SMS formatting limits
    ensure_setting(pool, "sms_review_quote_max_chars", "120").await?;
    ensure_setting(pool, "sms_draft_max_chars", "300").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
