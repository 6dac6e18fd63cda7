//! Business table operations

use crate::models::{Business, SubscriptionStatus};
use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

type BusinessRow = (String, String, String, i64, i64, i64, String);

const COLUMNS: &str =
    "guid, name, owner_phone, auto_approve, monitoring_paused, sms_opt_out, subscription_status";

fn map_row(row: BusinessRow) -> Result<Business> {
    Ok(Business {
        guid: super::parse_uuid(&row.0)?,
        name: row.1,
        owner_phone: row.2,
        auto_approve: row.3 != 0,
        monitoring_paused: row.4 != 0,
        sms_opt_out: row.5 != 0,
        subscription_status: SubscriptionStatus::parse(&row.6)?,
    })
}

/// Load a business by id
pub async fn get(pool: &SqlitePool, business_id: Uuid) -> Result<Option<Business>> {
    let row: Option<BusinessRow> = sqlx::query_as(&format!(
        "SELECT {} FROM businesses WHERE guid = ?",
        COLUMNS
    ))
    .bind(business_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Resolve the business an inbound SMS belongs to
pub async fn find_by_owner_phone(pool: &SqlitePool, phone: &str) -> Result<Option<Business>> {
    let row: Option<BusinessRow> = sqlx::query_as(&format!(
        "SELECT {} FROM businesses WHERE owner_phone = ? LIMIT 1",
        COLUMNS
    ))
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Businesses eligible for the ingestion cycle
///
/// Cancelled subscriptions and paused monitoring are skipped at the query
/// level so a poll run never touches them.
pub async fn list_pollable(pool: &SqlitePool) -> Result<Vec<Business>> {
    let rows: Vec<BusinessRow> = sqlx::query_as(&format!(
        "SELECT {} FROM businesses \
         WHERE subscription_status != 'cancelled' AND monitoring_paused = 0 \
         ORDER BY created_at",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_row).collect()
}

/// Set the monitoring-paused flag (PAUSE / RESUME commands)
pub async fn set_monitoring_paused(pool: &SqlitePool, business_id: Uuid, paused: bool) -> Result<()> {
    sqlx::query(
        "UPDATE businesses SET monitoring_paused = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(paused as i64)
    .bind(business_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Opt the owner out of SMS and pause monitoring (STOP command)
pub async fn opt_out(pool: &SqlitePool, business_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE businesses SET sms_opt_out = 1, monitoring_paused = 1, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(business_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Clear the paused and opt-out flags (RESUME command)
pub async fn resume(pool: &SqlitePool, business_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE businesses SET monitoring_paused = 0, sms_opt_out = 0, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(business_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Update the subscription lifecycle status
pub async fn set_subscription_status(
    pool: &SqlitePool,
    business_id: Uuid,
    status: SubscriptionStatus,
) -> Result<()> {
    sqlx::query(
        "UPDATE businesses SET subscription_status = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?",
    )
    .bind(status.as_str())
    .bind(business_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a business (used by onboarding, fixtures, and tests)
pub async fn insert(pool: &SqlitePool, business: &Business) -> Result<()> {
    sqlx::query(
        "INSERT INTO businesses (guid, name, owner_phone, auto_approve, monitoring_paused, sms_opt_out, subscription_status) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(business.guid.to_string())
    .bind(&business.name)
    .bind(&business.owner_phone)
    .bind(business.auto_approve as i64)
    .bind(business.monitoring_paused as i64)
    .bind(business.sms_opt_out as i64)
    .bind(business.subscription_status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}
