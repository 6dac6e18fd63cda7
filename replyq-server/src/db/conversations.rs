//! Conversation context operations
//!
//! One row per phone number, created lazily and never deleted. Every
//! command handler funnels its state transition through `set_state` so the
//! waiting-state invariant (a transition out of a waiting state clears the
//! field that made it reachable) lives in one place in the state machine,
//! not scattered across UPDATE statements.

use crate::models::{ConversationContext, ConversationState};
use replyq_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

type ContextRow = (String, String, String, Option<String>);

const COLUMNS: &str = "phone, business_id, state, pending_review_id";

fn map_row(row: ContextRow) -> Result<ConversationContext> {
    Ok(ConversationContext {
        phone: row.0,
        business_id: super::parse_uuid(&row.1)?,
        state: ConversationState::parse(&row.2)?,
        pending_review_id: row.3.as_deref().map(super::parse_uuid).transpose()?,
    })
}

/// Load the context for a phone number
pub async fn get(pool: &SqlitePool, phone: &str) -> Result<Option<ConversationContext>> {
    let row: Option<ContextRow> = sqlx::query_as(&format!(
        "SELECT {} FROM conversation_contexts WHERE phone = ?",
        COLUMNS
    ))
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    row.map(map_row).transpose()
}

/// Point the context at a freshly notified review
///
/// Upsert so the row exists even before the owner has ever texted in. Runs
/// BEFORE the gateway send, so a reply racing the send completion still
/// resolves against the right review.
pub async fn point_at_review(
    pool: &SqlitePool,
    phone: &str,
    business_id: Uuid,
    review_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO conversation_contexts (phone, business_id, state, pending_review_id) \
         VALUES (?, ?, 'idle', ?) \
         ON CONFLICT(phone) DO UPDATE SET \
             pending_review_id = excluded.pending_review_id, \
             state = 'idle', \
             updated_at = CURRENT_TIMESTAMP",
    )
    .bind(phone)
    .bind(business_id.to_string())
    .bind(review_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Create an idle context on first inbound SMS
pub async fn create_idle(pool: &SqlitePool, phone: &str, business_id: Uuid) -> Result<ConversationContext> {
    sqlx::query(
        "INSERT OR IGNORE INTO conversation_contexts (phone, business_id, state) VALUES (?, ?, 'idle')",
    )
    .bind(phone)
    .bind(business_id.to_string())
    .execute(pool)
    .await?;

    Ok(ConversationContext {
        phone: phone.to_string(),
        business_id,
        state: ConversationState::Idle,
        pending_review_id: None,
    })
}

/// Persist a state transition together with its pending review field
pub async fn set_state(
    pool: &SqlitePool,
    phone: &str,
    state: ConversationState,
    pending_review_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        "UPDATE conversation_contexts SET state = ?, pending_review_id = ?, updated_at = CURRENT_TIMESTAMP WHERE phone = ?",
    )
    .bind(state.as_str())
    .bind(pending_review_id.map(|id| id.to_string()))
    .bind(phone)
    .execute(pool)
    .await?;

    Ok(())
}
