//! Reply draft operations

use crate::models::{DraftStatus, Platform, ReplyDraft};
use chrono::{DateTime, Utc};
use replyq_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

type DraftRow = (
    String,
    String,
    String,
    String,
    i64,
    String,
    f64,
    Option<String>,
    Option<String>,
);

const COLUMNS: &str = "guid, review_id, text, status, escalation, escalation_reasons, \
                       confidence, failure_detail, approved_at";

fn map_row(row: DraftRow) -> Result<ReplyDraft> {
    let reasons: Vec<String> = serde_json::from_str(&row.5)
        .map_err(|e| Error::Internal(format!("Invalid escalation_reasons JSON: {}", e)))?;

    Ok(ReplyDraft {
        guid: super::parse_uuid(&row.0)?,
        review_id: super::parse_uuid(&row.1)?,
        text: row.2,
        status: DraftStatus::parse(&row.3)?,
        escalation: row.4 != 0,
        escalation_reasons: reasons,
        confidence: row.6,
        failure_detail: row.7,
        approved_at: row.8.as_deref().map(super::parse_ts).transpose()?,
    })
}

/// Insert a draft inside the caller's transaction (same one as its review)
pub async fn insert(conn: &mut SqliteConnection, draft: &ReplyDraft) -> Result<()> {
    let reasons = serde_json::to_string(&draft.escalation_reasons)
        .map_err(|e| Error::Internal(format!("Failed to serialize escalation reasons: {}", e)))?;

    sqlx::query(
        "INSERT INTO reply_drafts (guid, review_id, text, status, escalation, escalation_reasons, confidence, approved_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(draft.guid.to_string())
    .bind(draft.review_id.to_string())
    .bind(&draft.text)
    .bind(draft.status.as_str())
    .bind(draft.escalation as i64)
    .bind(reasons)
    .bind(draft.confidence)
    .bind(draft.approved_at.map(|t| t.to_rfc3339()))
    .execute(conn)
    .await?;

    Ok(())
}

/// Most recent draft for a review
///
/// The schema allows historical drafts per review; command handlers always
/// act on the newest one.
pub async fn latest_for_review(pool: &SqlitePool, review_id: Uuid) -> Result<Option<ReplyDraft>> {
    let row: Option<DraftRow> = sqlx::query_as(&format!(
        "SELECT {} FROM reply_drafts WHERE review_id = ? ORDER BY created_at DESC, guid DESC LIMIT 1",
        COLUMNS
    ))
    .bind(review_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Load a draft by id
pub async fn get(pool: &SqlitePool, draft_id: Uuid) -> Result<Option<ReplyDraft>> {
    let row: Option<DraftRow> = sqlx::query_as(&format!(
        "SELECT {} FROM reply_drafts WHERE guid = ?",
        COLUMNS
    ))
    .bind(draft_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Mark a draft approved (APPROVE command)
pub async fn approve(pool: &SqlitePool, draft_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE reply_drafts SET status = 'approved', approved_at = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(at.to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the draft text and approve in one statement (custom reply)
pub async fn approve_with_text(
    pool: &SqlitePool,
    draft_id: Uuid,
    text: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE reply_drafts SET text = ?, status = 'approved', approved_at = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(text)
    .bind(at.to_rfc3339())
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a draft rejected (IGNORE command)
pub async fn reject(pool: &SqlitePool, draft_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE reply_drafts SET status = 'rejected', updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Approved drafts with no posted_responses row, oldest approval first
///
/// The anti-join is the poster's idempotency source of truth; a draft that
/// already has a posted row is never selected again.
pub async fn approved_unposted(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<(ReplyDraft, Uuid, Platform, String)>> {
    let rows: Vec<(
        String,
        String,
        String,
        String,
        i64,
        String,
        f64,
        Option<String>,
        Option<String>,
        String,
        String,
        String,
    )> = sqlx::query_as(
        "SELECT d.guid, d.review_id, d.text, d.status, d.escalation, d.escalation_reasons, \
                d.confidence, d.failure_detail, d.approved_at, \
                r.business_id, r.platform, r.external_review_id \
         FROM reply_drafts d \
         JOIN reviews r ON r.guid = d.review_id \
         WHERE d.status = 'approved' \
           AND NOT EXISTS (SELECT 1 FROM posted_responses p WHERE p.draft_id = d.guid) \
         ORDER BY d.approved_at ASC \
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let business_id = super::parse_uuid(&row.9)?;
            let platform = Platform::parse(&row.10)?;
            let external_review_id = row.11.clone();
            let draft = map_row((
                row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8,
            ))?;
            Ok((draft, business_id, platform, external_review_id))
        })
        .collect()
}

/// Record why the last posting attempt failed (observability only)
pub async fn record_failure(pool: &SqlitePool, draft_id: Uuid, detail: &str) -> Result<()> {
    sqlx::query(
        "UPDATE reply_drafts SET failure_detail = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(detail)
    .bind(draft_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Flip a posted draft to sent inside the caller's transaction
pub async fn mark_sent(conn: &mut SqliteConnection, draft_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE reply_drafts SET status = 'sent', failure_detail = NULL, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(draft_id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}

/// Count of drafts still awaiting a decision for a business (STATUS command)
pub async fn pending_count_for_business(pool: &SqlitePool, business_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reply_drafts d \
         JOIN reviews r ON r.guid = d.review_id \
         WHERE r.business_id = ? AND d.status = 'pending'",
    )
    .bind(business_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count)
}
