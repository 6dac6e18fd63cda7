//! Notification log operations
//!
//! Append-only audit trail of every SMS in either direction. The inbound
//! gateway message id doubles as the duplicate-delivery detection key.

use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Log an outbound SMS attempt; returns the log entry id
pub async fn log_outbound(
    pool: &SqlitePool,
    phone: &str,
    body: &str,
    gateway_message_id: Option<&str>,
    delivery_status: &str,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO notification_log (guid, direction, phone, body, gateway_message_id, delivery_status) \
         VALUES (?, 'outbound', ?, ?, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(phone)
    .bind(body)
    .bind(gateway_message_id)
    .bind(delivery_status)
    .execute(pool)
    .await?;

    Ok(guid)
}

/// Log an inbound SMS with the command the parser resolved it to
pub async fn log_inbound(
    pool: &SqlitePool,
    phone: &str,
    body: &str,
    parsed_command: &str,
    gateway_message_id: &str,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO notification_log (guid, direction, phone, body, parsed_command, gateway_message_id, delivery_status) \
         VALUES (?, 'inbound', ?, ?, ?, ?, 'received')",
    )
    .bind(guid.to_string())
    .bind(phone)
    .bind(body)
    .bind(parsed_command)
    .bind(gateway_message_id)
    .execute(pool)
    .await?;

    Ok(guid)
}

/// Duplicate-delivery check for inbound webhooks
pub async fn inbound_exists(pool: &SqlitePool, gateway_message_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM notification_log WHERE direction = 'inbound' AND gateway_message_id = ?)",
    )
    .bind(gateway_message_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Update delivery status from the gateway's status callback
///
/// Returns the number of rows touched; zero means the gateway id is unknown
/// (callback for a message we never logged), which the caller treats as
/// best-effort and ignores.
pub async fn update_delivery_status(
    pool: &SqlitePool,
    gateway_message_id: &str,
    status: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE notification_log SET delivery_status = ? WHERE gateway_message_id = ? AND direction = 'outbound'",
    )
    .bind(status)
    .bind(gateway_message_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
