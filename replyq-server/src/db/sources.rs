//! Review source (connected platform listing) operations

use crate::models::{CredentialsStatus, Platform, ReviewSourceRecord};
use chrono::{DateTime, Utc};
use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

type SourceRow = (String, String, String, String, String, Option<String>);

const COLUMNS: &str =
    "guid, business_id, platform, external_source_id, credentials_status, last_polled_at";

fn map_row(row: SourceRow) -> Result<ReviewSourceRecord> {
    Ok(ReviewSourceRecord {
        guid: super::parse_uuid(&row.0)?,
        business_id: super::parse_uuid(&row.1)?,
        platform: Platform::parse(&row.2)?,
        external_source_id: row.3,
        credentials_status: CredentialsStatus::parse(&row.4)?,
        last_polled_at: row.5.as_deref().map(super::parse_ts).transpose()?,
    })
}

/// All sources connected to a business
pub async fn list_for_business(pool: &SqlitePool, business_id: Uuid) -> Result<Vec<ReviewSourceRecord>> {
    let rows: Vec<SourceRow> = sqlx::query_as(&format!(
        "SELECT {} FROM review_sources WHERE business_id = ? ORDER BY created_at",
        COLUMNS
    ))
    .bind(business_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_row).collect()
}

/// Find the source for a business/platform pair
pub async fn find(
    pool: &SqlitePool,
    business_id: Uuid,
    platform: Platform,
) -> Result<Option<ReviewSourceRecord>> {
    let row: Option<SourceRow> = sqlx::query_as(&format!(
        "SELECT {} FROM review_sources WHERE business_id = ? AND platform = ? LIMIT 1",
        COLUMNS
    ))
    .bind(business_id.to_string())
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Mark a source's credentials revoked
///
/// Revoked sources are skipped by the ingestion cycle and the response
/// poster until re-authorized out of band; the STATUS command surfaces them.
pub async fn mark_revoked(pool: &SqlitePool, source_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE review_sources SET credentials_status = 'revoked', updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(source_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record when a source was last polled
pub async fn set_last_polled(pool: &SqlitePool, source_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE review_sources SET last_polled_at = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(at.to_rfc3339())
    .bind(source_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a source (used by onboarding, fixtures, and tests)
pub async fn insert(pool: &SqlitePool, source: &ReviewSourceRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO review_sources (guid, business_id, platform, external_source_id, credentials_status, last_polled_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(source.guid.to_string())
    .bind(source.business_id.to_string())
    .bind(source.platform.as_str())
    .bind(&source.external_source_id)
    .bind(source.credentials_status.as_str())
    .bind(source.last_polled_at.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}
