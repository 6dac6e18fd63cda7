//! Competitor list operations (populated by the COMPETITOR ADD flow)

use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Add a competitor by name; re-adding the same name is a no-op
pub async fn insert(pool: &SqlitePool, business_id: Uuid, name: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO competitors (guid, business_id, name) VALUES (?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(business_id.to_string())
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Competitor count for a business
pub async fn count_for_business(pool: &SqlitePool, business_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM competitors WHERE business_id = ?")
        .bind(business_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}
