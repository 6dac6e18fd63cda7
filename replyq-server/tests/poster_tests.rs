//! Response poster integration tests
//!
//! Posting idempotence, the unconditional re-sweep on failure, and the
//! revoked-credentials skip.

mod helpers;

use helpers::*;
use replyq_server::db;
use replyq_server::models::{DraftStatus, Platform};
use replyq_server::services::ResponsePoster;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn poster(pool: &sqlx::SqlitePool, platform: Arc<FakePlatformPoster>) -> ResponsePoster {
    ResponsePoster::new(pool.clone(), test_event_bus(), platform)
}

#[tokio::test]
async fn approved_draft_posts_exactly_once() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_source(&pool, &business, Platform::Google).await;
    let (review, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Approved).await;

    let platform = Arc::new(FakePlatformPoster::default());
    let p = poster(&pool, platform.clone());

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.posted, 1);

    // Status flipped and the idempotency marker exists
    let status: String = sqlx::query_scalar("SELECT status FROM reply_drafts WHERE guid = ?")
        .bind(draft.guid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "sent");
    assert_eq!(db::posted::count_for_draft(&pool, draft.guid).await.unwrap(), 1);

    let posted = platform.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].1, review.external_review_id);

    drop(posted);

    // Second sweep with no state change: nothing to do
    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.examined, 0);
    assert_eq!(db::posted::count_for_draft(&pool, draft.guid).await.unwrap(), 1);
    assert_eq!(platform.posted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failure_leaves_draft_approved_for_next_sweep() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_source(&pool, &business, Platform::Google).await;
    let (_, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Approved).await;

    let platform = Arc::new(FakePlatformPoster::default());
    platform.fail.store(true, Ordering::SeqCst);
    let p = poster(&pool, platform.clone());

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.failed, 1);

    let (status, failure_detail): (String, Option<String>) =
        sqlx::query_as("SELECT status, failure_detail FROM reply_drafts WHERE guid = ?")
            .bind(draft.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "approved");
    assert!(failure_detail.unwrap().contains("platform timeout"));
    assert_eq!(db::posted::count_for_draft(&pool, draft.guid).await.unwrap(), 0);

    // The next sweep retries unconditionally and succeeds
    platform.fail.store(false, Ordering::SeqCst);
    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.posted, 1);

    let (status, failure_detail): (String, Option<String>) =
        sqlx::query_as("SELECT status, failure_detail FROM reply_drafts WHERE guid = ?")
            .bind(draft.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "sent");
    assert!(failure_detail.is_none());
}

#[tokio::test]
async fn revoked_credentials_mark_source_and_skip_thereafter() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    let source = insert_source(&pool, &business, Platform::Google).await;
    insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Approved).await;

    let platform = Arc::new(FakePlatformPoster::default());
    platform.revoked.store(true, Ordering::SeqCst);
    let p = poster(&pool, platform.clone());

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.failed, 1);

    let status: String =
        sqlx::query_scalar("SELECT credentials_status FROM review_sources WHERE guid = ?")
            .bind(source.guid.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "revoked");

    // No more attempts against the revoked source
    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn first_labeled_option_is_posted() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_source(&pool, &business, Platform::Google).await;
    let (_, draft) =
        insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Approved).await;

    sqlx::query("UPDATE reply_drafts SET text = ? WHERE guid = ?")
        .bind("Option 1: Thanks so much!\nOption 2: We appreciate it.")
        .bind(draft.guid.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let platform = Arc::new(FakePlatformPoster::default());
    let p = poster(&pool, platform.clone());
    p.run_sweep().await.unwrap();

    let posted = platform.posted.lock().unwrap();
    assert_eq!(posted[0].2, "Thanks so much!");
}

#[tokio::test]
async fn pending_and_rejected_drafts_are_not_selected() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_source(&pool, &business, Platform::Google).await;
    insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Pending).await;
    insert_review_with_draft(&pool, &business, "ext-2", DraftStatus::Rejected).await;
    insert_review_with_draft(&pool, &business, "ext-3", DraftStatus::Sent).await;

    let platform = Arc::new(FakePlatformPoster::default());
    let p = poster(&pool, platform.clone());

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.examined, 0);
    assert!(platform.posted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sweep_respects_batch_size() {
    let pool = setup_pool().await;
    let business = insert_business(&pool, false).await;
    insert_source(&pool, &business, Platform::Google).await;
    insert_review_with_draft(&pool, &business, "ext-1", DraftStatus::Approved).await;
    insert_review_with_draft(&pool, &business, "ext-2", DraftStatus::Approved).await;
    insert_review_with_draft(&pool, &business, "ext-3", DraftStatus::Approved).await;

    sqlx::query("UPDATE settings SET value = '2' WHERE key = 'post_batch_size'")
        .execute(&pool)
        .await
        .unwrap();

    let platform = Arc::new(FakePlatformPoster::default());
    let p = poster(&pool, platform.clone());

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.examined, 2);
    assert_eq!(stats.posted, 2);

    let stats = p.run_sweep().await.unwrap();
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.posted, 1);
}
