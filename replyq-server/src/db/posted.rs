//! Posted response operations
//!
//! The UNIQUE draft_id column makes double-posting impossible even if two
//! sweeps race; the second insert fails and the sweep treats that as
//! already-posted.

use crate::models::Platform;
use chrono::{DateTime, Utc};
use replyq_common::Result;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Insert the posted-response marker inside the caller's transaction
pub async fn insert(
    conn: &mut SqliteConnection,
    draft_id: Uuid,
    review_id: Uuid,
    platform: Platform,
    platform_reply_id: Option<&str>,
    posted_at: DateTime<Utc>,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO posted_responses (guid, draft_id, review_id, platform, platform_reply_id, posted_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(draft_id.to_string())
    .bind(review_id.to_string())
    .bind(platform.as_str())
    .bind(platform_reply_id)
    .bind(posted_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(guid)
}

/// Idempotency check used by tests and diagnostics
pub async fn count_for_draft(pool: &SqlitePool, draft_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posted_responses WHERE draft_id = ?")
        .bind(draft_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}
