//! Review table operations
//!
//! Reviews are immutable once created; there are no UPDATE statements here.

use crate::models::{Platform, Review, Sentiment};
use chrono::{DateTime, Utc};
use replyq_common::{Error, Result};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

type ReviewRow = (
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    String,
    String,
    String,
    f64,
    Option<String>,
);

const COLUMNS: &str = "guid, business_id, platform, external_review_id, rating, author_name, \
                       text, review_date, sentiment, sentiment_score, metadata";

fn map_row(row: ReviewRow) -> Result<Review> {
    let metadata = match row.10 {
        Some(json) if !json.is_empty() => serde_json::from_str(&json)
            .map_err(|e| Error::Internal(format!("Invalid review metadata JSON: {}", e)))?,
        _ => serde_json::Value::Object(Default::default()),
    };

    Ok(Review {
        guid: super::parse_uuid(&row.0)?,
        business_id: super::parse_uuid(&row.1)?,
        platform: Platform::parse(&row.2)?,
        external_review_id: row.3,
        rating: row.4,
        author_name: row.5,
        text: row.6,
        review_date: super::parse_ts(&row.7)?,
        sentiment: Sentiment::parse(&row.8)?,
        sentiment_score: row.9,
        metadata,
    })
}

/// Existence check by dedup key; the expected steady-state skip path
pub async fn exists(pool: &SqlitePool, platform: Platform, external_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM reviews WHERE platform = ? AND external_review_id = ?)",
    )
    .bind(platform.as_str())
    .bind(external_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Newest stored review date for a business/platform pair
///
/// Passed as `since` to the source adapter so each poll fetches a window
/// starting where the last one left off.
pub async fn watermark(
    pool: &SqlitePool,
    business_id: Uuid,
    platform: Platform,
) -> Result<Option<DateTime<Utc>>> {
    let max: Option<String> = sqlx::query_scalar(
        "SELECT MAX(review_date) FROM reviews WHERE business_id = ? AND platform = ?",
    )
    .bind(business_id.to_string())
    .bind(platform.as_str())
    .fetch_one(pool)
    .await?;

    max.as_deref().map(super::parse_ts).transpose()
}

/// Insert a review inside the caller's transaction
pub async fn insert(conn: &mut SqliteConnection, review: &Review) -> Result<()> {
    let metadata = serde_json::to_string(&review.metadata)
        .map_err(|e| Error::Internal(format!("Failed to serialize review metadata: {}", e)))?;

    sqlx::query(
        "INSERT INTO reviews (guid, business_id, platform, external_review_id, rating, author_name, \
                              text, review_date, sentiment, sentiment_score, metadata) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(review.guid.to_string())
    .bind(review.business_id.to_string())
    .bind(review.platform.as_str())
    .bind(&review.external_review_id)
    .bind(review.rating)
    .bind(&review.author_name)
    .bind(&review.text)
    .bind(review.review_date.to_rfc3339())
    .bind(review.sentiment.as_str())
    .bind(review.sentiment_score)
    .bind(metadata)
    .execute(conn)
    .await?;

    Ok(())
}

/// Load a review by id
pub async fn get(pool: &SqlitePool, review_id: Uuid) -> Result<Option<Review>> {
    let row: Option<ReviewRow> = sqlx::query_as(&format!(
        "SELECT {} FROM reviews WHERE guid = ?",
        COLUMNS
    ))
    .bind(review_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}
