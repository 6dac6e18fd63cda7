//! Notification retry-state operations
//!
//! A row exists only while an alert is failed and retryable (or has been
//! declared terminal). Success deletes the row, which is what "clear all
//! retry fields" means here.

use crate::models::RetryRecord;
use chrono::{DateTime, Utc};
use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

type RetryRow = (String, String, i64, String, i64, Option<String>);

const COLUMNS: &str =
    "notification_id, review_id, attempt_count, next_attempt_at, terminal, last_error";

fn map_row(row: RetryRow) -> Result<RetryRecord> {
    Ok(RetryRecord {
        notification_id: super::parse_uuid(&row.0)?,
        review_id: super::parse_uuid(&row.1)?,
        attempt_count: row.2,
        next_attempt_at: super::parse_ts(&row.3)?,
        terminal: row.4 != 0,
        last_error: row.5,
    })
}

/// Record a fresh dispatch failure as retryable
pub async fn schedule(
    pool: &SqlitePool,
    notification_id: Uuid,
    review_id: Uuid,
    next_attempt_at: DateTime<Utc>,
    last_error: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO notification_retries (notification_id, review_id, attempt_count, next_attempt_at, last_error) \
         VALUES (?, ?, 0, ?, ?)",
    )
    .bind(notification_id.to_string())
    .bind(review_id.to_string())
    .bind(next_attempt_at.to_rfc3339())
    .bind(last_error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Retryable records whose backoff delay has elapsed
///
/// Ordered oldest-ingested-first by joining on the review row, bounded by
/// the sweep batch size.
pub async fn due(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    max_attempts: i64,
    limit: i64,
) -> Result<Vec<RetryRecord>> {
    let rows: Vec<RetryRow> = sqlx::query_as(&format!(
        "SELECT nr.{} FROM notification_retries nr \
         JOIN reviews r ON r.guid = nr.review_id \
         WHERE nr.terminal = 0 AND nr.attempt_count < ? AND nr.next_attempt_at <= ? \
         ORDER BY r.created_at ASC \
         LIMIT ?",
        COLUMNS.replace(", ", ", nr.")
    ))
    .bind(max_attempts)
    .bind(now.to_rfc3339())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_row).collect()
}

/// Load one retry record
pub async fn get(pool: &SqlitePool, notification_id: Uuid) -> Result<Option<RetryRecord>> {
    let row: Option<RetryRow> = sqlx::query_as(&format!(
        "SELECT {} FROM notification_retries WHERE notification_id = ?",
        COLUMNS
    ))
    .bind(notification_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Push the next attempt further out after another failure
pub async fn reschedule(
    pool: &SqlitePool,
    notification_id: Uuid,
    attempt_count: i64,
    next_attempt_at: DateTime<Utc>,
    last_error: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE notification_retries SET attempt_count = ?, next_attempt_at = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE notification_id = ?",
    )
    .bind(attempt_count)
    .bind(next_attempt_at.to_rfc3339())
    .bind(last_error)
    .bind(notification_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Stop scheduling this alert permanently
pub async fn mark_terminal(
    pool: &SqlitePool,
    notification_id: Uuid,
    attempt_count: i64,
    last_error: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE notification_retries SET terminal = 1, attempt_count = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE notification_id = ?",
    )
    .bind(attempt_count)
    .bind(last_error)
    .bind(notification_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete the record after a successful resend (clears all retry state)
pub async fn clear(pool: &SqlitePool, notification_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM notification_retries WHERE notification_id = ?")
        .bind(notification_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
