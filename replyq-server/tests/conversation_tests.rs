//! Conversation state machine integration tests
//!
//! Exercises the full inbound path: dedup, lazy context creation, command
//! parsing against state, handler side effects, and the fail-safe replies.

mod helpers;

use helpers::*;
use replyq_server::db;
use replyq_server::models::{ConversationState, DraftStatus};
use replyq_server::services::conversation::{InboundOutcome, FALLBACK_REPLY};
use replyq_server::services::ConversationStateMachine;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn machine(pool: &sqlx::SqlitePool, billing: Arc<FakeBillingPortal>) -> ConversationStateMachine {
    ConversationStateMachine::new(pool.clone(), test_event_bus(), billing)
}

fn reply(outcome: InboundOutcome) -> String {
    match outcome {
        InboundOutcome::Reply(text) => text,
        InboundOutcome::Duplicate => panic!("expected a reply, got duplicate"),
    }
}

async fn context_state(pool: &sqlx::SqlitePool) -> (ConversationState, Option<String>) {
    let (state, pending): (String, Option<String>) = sqlx::query_as(
        "SELECT state, pending_review_id FROM conversation_contexts WHERE phone = ?",
    )
    .bind(OWNER_PHONE)
    .fetch_one(pool)
    .await
    .unwrap();
    (ConversationState::parse(&state).unwrap(), pending)
}

#[tokio::test]
async fn edit_prompts_and_waits_for_custom_reply() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, _) = insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "EDIT", "sid-1").await);

    assert!(text.contains("Text your reply"));
    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::AwaitingCustomReply);
    assert_eq!(pending, Some(review.guid.to_string()));
}

#[tokio::test]
async fn custom_reply_overwrites_draft_and_returns_to_idle() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    reply(sm.handle_inbound(OWNER_PHONE, "EDIT", "sid-1").await);
    let text = reply(
        sm.handle_inbound(OWNER_PHONE, "Thanks, come back soon!", "sid-2")
            .await,
    );

    assert!(text.contains("saved"));

    let (draft_text, status): (String, String) =
        sqlx::query_as("SELECT text, status FROM reply_drafts WHERE guid = ?")
            .bind(draft.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(draft_text, "Thanks, come back soon!");
    assert_eq!(status, "approved");

    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
    assert_eq!(pending, None);
}

#[tokio::test]
async fn approve_marks_draft_and_clears_pending() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "approve", "sid-1").await);

    assert!(text.contains("Approved"));
    assert!(text.contains("google"));

    let status: String = sqlx::query_scalar("SELECT status FROM reply_drafts WHERE guid = ?")
        .bind(draft.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "approved");

    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
    assert_eq!(pending, None);
}

#[tokio::test]
async fn approve_without_pending_review_is_a_noop() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "APPROVE", "sid-1").await);

    assert!(text.contains("no review waiting"));
    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
    assert_eq!(pending, None);
}

#[tokio::test]
async fn cancel_then_no_leaves_subscription_untouched() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let billing = Arc::new(FakeBillingPortal::default());
    let sm = machine(&pool, billing.clone());

    let text = reply(sm.handle_inbound(OWNER_PHONE, "CANCEL", "sid-1").await);
    assert!(text.contains("YES to confirm"));
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::AwaitingCancelConfirm);

    let text = reply(sm.handle_inbound(OWNER_PHONE, "NO", "sid-2").await);
    assert!(text.contains("No changes"));

    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);

    // No billing side effect was attempted
    assert_eq!(billing.cancel_calls.load(Ordering::SeqCst), 0);

    let status: String = sqlx::query_scalar("SELECT subscription_status FROM businesses WHERE guid = ?")
        .bind(business.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");
}

#[tokio::test]
async fn confirmed_cancel_calls_billing_and_persists() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let billing = Arc::new(FakeBillingPortal::default());
    let sm = machine(&pool, billing.clone());

    reply(sm.handle_inbound(OWNER_PHONE, "CANCEL", "sid-1").await);
    let text = reply(sm.handle_inbound(OWNER_PHONE, "YES", "sid-2").await);

    assert!(text.contains("cancelled"));
    assert_eq!(billing.cancel_calls.load(Ordering::SeqCst), 1);

    let (status, paused): (String, i64) =
        sqlx::query_as("SELECT subscription_status, monitoring_paused FROM businesses WHERE guid = ?")
            .bind(business.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "cancelled");
    assert_eq!(paused, 1);
}

#[tokio::test]
async fn billing_failure_keeps_local_state_unchanged() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let billing = Arc::new(FakeBillingPortal::default());
    billing.fail.store(true, Ordering::SeqCst);
    let sm = machine(&pool, billing.clone());

    reply(sm.handle_inbound(OWNER_PHONE, "CANCEL", "sid-1").await);
    let text = reply(sm.handle_inbound(OWNER_PHONE, "YES", "sid-2").await);

    assert!(text.contains("nothing was changed"));

    let status: String = sqlx::query_scalar("SELECT subscription_status FROM businesses WHERE guid = ?")
        .bind(business.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");

    // The channel never hangs: back to idle, CANCEL can be retried
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
}

#[tokio::test]
async fn duplicate_gateway_message_id_is_a_noop() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));

    reply(sm.handle_inbound(OWNER_PHONE, "EDIT", "sid-dup").await);
    // Gateway redelivers the same message
    let outcome = sm.handle_inbound(OWNER_PHONE, "EDIT", "sid-dup").await;
    assert_eq!(outcome, InboundOutcome::Duplicate);

    // Exactly one inbound log row, state advanced exactly once
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notification_log WHERE direction = 'inbound' AND gateway_message_id = 'sid-dup'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);

    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::AwaitingCustomReply);
    assert_eq!(pending, Some(review.guid.to_string()));

    // The draft is untouched
    let status: String = sqlx::query_scalar("SELECT status FROM reply_drafts WHERE guid = ?")
        .bind(draft.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "pending");
}

#[tokio::test]
async fn yes_in_idle_is_unknown() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "YES", "sid-1").await);

    assert!(text.contains("didn't catch that"));
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
}

#[tokio::test]
async fn ignore_override_rejects_draft_from_edit_state() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    reply(sm.handle_inbound(OWNER_PHONE, "EDIT", "sid-1").await);
    let text = reply(sm.handle_inbound(OWNER_PHONE, "IGNORE", "sid-2").await);

    assert!(text.contains("Skipped"));

    let status: String = sqlx::query_scalar("SELECT status FROM reply_drafts WHERE guid = ?")
        .bind(draft.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "rejected");

    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
    assert_eq!(pending, None);
}

#[tokio::test]
async fn stop_opts_out_and_clears_pending() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, _) = insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "STOP", "sid-1").await);

    assert!(text.contains("unsubscribed"));

    let (opt_out, paused): (i64, i64) =
        sqlx::query_as("SELECT sms_opt_out, monitoring_paused FROM businesses WHERE guid = ?")
            .bind(business.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(opt_out, 1);
    assert_eq!(paused, 1);

    let (state, pending) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);
    assert_eq!(pending, None);
}

#[tokio::test]
async fn pause_and_resume_toggle_monitoring() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));

    reply(sm.handle_inbound(OWNER_PHONE, "PAUSE", "sid-1").await);
    let paused: i64 = sqlx::query_scalar("SELECT monitoring_paused FROM businesses WHERE guid = ?")
        .bind(business.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(paused, 1);

    reply(sm.handle_inbound(OWNER_PHONE, "RESUME", "sid-2").await);
    let paused: i64 = sqlx::query_scalar("SELECT monitoring_paused FROM businesses WHERE guid = ?")
        .bind(business.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(paused, 0);
}

#[tokio::test]
async fn status_reports_pending_and_revoked_sources() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    let source = insert_source(&pool, &business, replyq_server::models::Platform::Google).await;
    db::sources::mark_revoked(&pool, source.guid).await.unwrap();
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "STATUS", "sid-1").await);

    assert!(text.contains("1 review(s)"));
    assert!(text.contains("google connection needs re-authorization"));
}

#[tokio::test]
async fn billing_returns_portal_link() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let billing = Arc::new(FakeBillingPortal::default());
    let sm = machine(&pool, billing.clone());
    let text = reply(sm.handle_inbound(OWNER_PHONE, "BILLING", "sid-1").await);

    assert!(text.contains("https://billing.example/portal/abc123"));
    assert_eq!(billing.portal_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn competitor_add_compound_and_two_step() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    db::conversations::create_idle(&pool, OWNER_PHONE, business.guid)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));

    // Compound form stays in idle
    let text = reply(
        sm.handle_inbound(OWNER_PHONE, "COMPETITOR ADD Joe's Pizza", "sid-1")
            .await,
    );
    assert!(text.contains("Joe's Pizza"));
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);

    // Two-step form round-trips through awaiting_competitor_add
    let text = reply(sm.handle_inbound(OWNER_PHONE, "COMPETITOR", "sid-2").await);
    assert!(text.contains("name of the competitor"));
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::AwaitingCompetitorAdd);

    let text = reply(sm.handle_inbound(OWNER_PHONE, "Blue Bottle", "sid-3").await);
    assert!(text.contains("Blue Bottle"));
    let (state, _) = context_state(&pool).await;
    assert_eq!(state, ConversationState::Idle);

    let count = db::competitors::count_for_business(&pool, business.guid)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn unregistered_phone_gets_generic_reply() {
    let pool = setup_pool().await;

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound("+19998887777", "APPROVE", "sid-1").await);

    assert!(text.contains("isn't linked"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation_contexts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn internal_error_yields_deterministic_fallback() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let (review, _) = insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    db::conversations::point_at_review(&pool, OWNER_PHONE, business.guid, review.guid)
        .await
        .unwrap();

    // Orphan the pending pointer: the draft disappears out from under it
    sqlx::query("DELETE FROM reply_drafts")
        .execute(&pool)
        .await
        .unwrap();

    let sm = machine(&pool, Arc::new(FakeBillingPortal::default()));
    let text = reply(sm.handle_inbound(OWNER_PHONE, "APPROVE", "sid-1").await);

    assert_eq!(text, FALLBACK_REPLY);
}
