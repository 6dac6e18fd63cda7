//! Shared test fixtures and fake collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use replyq_common::events::EventBus;
use replyq_server::models::{
    Business, CredentialsStatus, DraftStatus, Platform, RawReview, ReplyDraft, ReplyOutput, Review,
    ReviewSourceRecord, Sentiment, SubscriptionStatus,
};
use replyq_server::services::billing::{BillingError, BillingPortal};
use replyq_server::services::gateway::{GatewayError, SmsGateway};
use replyq_server::services::generator::{GeneratorError, ReplyGenerator};
use replyq_server::services::platform::{PlatformPoster, PostError, PostedReply};
use replyq_server::services::sources::{ReviewSource, SourceError};
use replyq_server::services::{
    ConversationStateMachine, IngestionCoordinator, NotificationDispatcher, ResponsePoster,
    RetryScheduler,
};
use std::sync::Arc;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const OWNER_PHONE: &str = "+15550000001";

/// In-memory pool with the full schema applied
pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    replyq_common::db::init_schema(&pool).await.unwrap();
    pool
}

pub fn test_event_bus() -> EventBus {
    EventBus::new(64)
}

/// Insert a business and return the model
pub async fn insert_business(pool: &SqlitePool, auto_approve: bool) -> Business {
    let business = Business {
        guid: Uuid::new_v4(),
        name: "Corner Cafe".to_string(),
        owner_phone: OWNER_PHONE.to_string(),
        auto_approve,
        monitoring_paused: false,
        sms_opt_out: false,
        subscription_status: SubscriptionStatus::Active,
    };
    replyq_server::db::businesses::insert(pool, &business)
        .await
        .unwrap();
    business
}

/// Insert a review source for a business
pub async fn insert_source(pool: &SqlitePool, business: &Business, platform: Platform) -> ReviewSourceRecord {
    let external_source_id = format!("loc-{}-{}", platform.as_str(), &business.guid.to_string()[..8]);
    let source = ReviewSourceRecord {
        guid: Uuid::new_v4(),
        business_id: business.guid,
        platform,
        external_source_id,
        credentials_status: CredentialsStatus::Active,
        last_polled_at: None,
    };
    replyq_server::db::sources::insert(pool, &source).await.unwrap();
    source
}

/// Insert a review together with a draft in the given status
pub async fn insert_review_with_draft(
    pool: &SqlitePool,
    business: &Business,
    external_id: &str,
    draft_status: DraftStatus,
) -> (Review, ReplyDraft) {
    let now = Utc::now();
    let review = Review {
        guid: Uuid::new_v4(),
        business_id: business.guid,
        platform: Platform::Google,
        external_review_id: external_id.to_string(),
        rating: 2,
        author_name: Some("Dana".to_string()),
        text: "The soup was cold.".to_string(),
        review_date: now - Duration::hours(1),
        sentiment: Sentiment::Negative,
        sentiment_score: -0.5,
        metadata: serde_json::Value::Object(Default::default()),
    };
    let draft = ReplyDraft {
        guid: Uuid::new_v4(),
        review_id: review.guid,
        text: "We're sorry to hear that.".to_string(),
        status: draft_status,
        escalation: false,
        escalation_reasons: vec![],
        confidence: 0.9,
        failure_detail: None,
        approved_at: matches!(draft_status, DraftStatus::Approved | DraftStatus::Sent)
            .then_some(now),
    };

    let mut tx = pool.begin().await.unwrap();
    replyq_server::db::reviews::insert(&mut *tx, &review)
        .await
        .unwrap();
    replyq_server::db::drafts::insert(&mut *tx, &draft)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    (review, draft)
}

/// Build a raw review as a source would return it
pub fn raw_review(external_id: &str, rating: i64, text: &str) -> RawReview {
    RawReview {
        external_id: external_id.to_string(),
        rating,
        author_name: Some("Alex".to_string()),
        text: text.to_string(),
        review_date: Utc::now() - Duration::minutes(30),
    }
}

/// Full application state wired with fake collaborators, for router tests
pub fn build_state(pool: &SqlitePool, webhook_secret: Option<String>) -> replyq_server::AppState {
    let bus = test_event_bus();
    let gateway = Arc::new(FakeSmsGateway::default());
    let notifier = Arc::new(NotificationDispatcher::new(
        pool.clone(),
        bus.clone(),
        gateway,
    ));
    let ingestion = Arc::new(IngestionCoordinator::new(
        pool.clone(),
        bus.clone(),
        Arc::new(FakeReviewSource::default()),
        Arc::new(FakeReplyGenerator::default()),
        notifier.clone(),
    ));
    let retry = Arc::new(RetryScheduler::new(pool.clone(), bus.clone(), notifier));
    let poster = Arc::new(ResponsePoster::new(
        pool.clone(),
        bus.clone(),
        Arc::new(FakePlatformPoster::default()),
    ));
    let conversation = Arc::new(ConversationStateMachine::new(
        pool.clone(),
        bus.clone(),
        Arc::new(FakeBillingPortal::default()),
    ));

    replyq_server::AppState::new(
        pool.clone(),
        bus,
        conversation,
        ingestion,
        poster,
        retry,
        webhook_secret,
    )
}

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Review source serving canned windows, with optional failure injection
#[derive(Default)]
pub struct FakeReviewSource {
    pub reviews: Mutex<Vec<RawReview>>,
    pub fail: AtomicBool,
    pub revoked: AtomicBool,
    /// Fail only for these external source ids (others keep working)
    pub fail_source_ids: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
    pub last_since: Mutex<Option<DateTime<Utc>>>,
}

impl FakeReviewSource {
    pub fn with_reviews(reviews: Vec<RawReview>) -> Self {
        Self {
            reviews: Mutex::new(reviews),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ReviewSource for FakeReviewSource {
    async fn fetch_reviews(
        &self,
        source: &ReviewSourceRecord,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawReview>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock().unwrap() = since;

        if self.revoked.load(Ordering::SeqCst) {
            return Err(SourceError::CredentialsRevoked(
                source.external_source_id.clone(),
            ));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Network("connection refused".to_string()));
        }
        if self
            .fail_source_ids
            .lock()
            .unwrap()
            .contains(&source.external_source_id)
        {
            return Err(SourceError::Network("connection refused".to_string()));
        }

        Ok(self.reviews.lock().unwrap().clone())
    }
}

/// Reply generator returning a fixed draft, with optional failure injection
pub struct FakeReplyGenerator {
    pub draft_text: String,
    pub escalation: bool,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl Default for FakeReplyGenerator {
    fn default() -> Self {
        Self {
            draft_text: "Thank you for your feedback!".to_string(),
            escalation: false,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReplyGenerator for FakeReplyGenerator {
    async fn generate_reply(
        &self,
        _review: &Review,
        _business: &Business,
    ) -> Result<ReplyOutput, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(GeneratorError::Api(500, "model unavailable".to_string()));
        }

        Ok(ReplyOutput {
            draft_text: self.draft_text.clone(),
            escalation: self.escalation,
            escalation_reasons: vec![],
            confidence: 0.9,
        })
    }
}

/// SMS gateway recording sends, with optional failure injection
#[derive(Default)]
pub struct FakeSmsGateway {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
    pub counter: AtomicUsize,
}

#[async_trait]
impl SmsGateway for FakeSmsGateway {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api(503, "gateway unavailable".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(format!("SM{:08}", n))
    }
}

/// Platform poster recording posts, with selectable failure mode
#[derive(Default)]
pub struct FakePlatformPoster {
    pub posted: Mutex<Vec<(Platform, String, String)>>,
    pub fail: AtomicBool,
    pub revoked: AtomicBool,
}

#[async_trait]
impl PlatformPoster for FakePlatformPoster {
    async fn post_reply(
        &self,
        platform: Platform,
        external_review_id: &str,
        text: &str,
    ) -> Result<PostedReply, PostError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(PostError::CredentialsRevoked(external_review_id.to_string()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PostError::Api(502, "platform timeout".to_string()));
        }

        self.posted.lock().unwrap().push((
            platform,
            external_review_id.to_string(),
            text.to_string(),
        ));
        Ok(PostedReply {
            platform_reply_id: Some("reply-1".to_string()),
        })
    }
}

/// Billing portal recording cancellations, with optional failure injection
#[derive(Default)]
pub struct FakeBillingPortal {
    pub cancel_calls: AtomicUsize,
    pub portal_calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl BillingPortal for FakeBillingPortal {
    async fn portal_url(&self, _business: &Business) -> Result<String, BillingError> {
        self.portal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Api(500, "billing down".to_string()));
        }
        Ok("https://billing.example/portal/abc123".to_string())
    }

    async fn cancel_subscription(&self, _business: &Business) -> Result<(), BillingError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BillingError::Api(500, "billing down".to_string()));
        }
        Ok(())
    }
}
