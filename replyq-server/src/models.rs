//! Domain models for the review-reply workflow
//!
//! Enum fields that the schema constrains with CHECK clauses are modeled as
//! closed Rust enums with explicit string conversions, so every state
//! comparison is exhaustive at compile time.

use chrono::{DateTime, Utc};
use replyq_common::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review platform a source or review belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Yelp,
    Facebook,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Google => "google",
            Platform::Yelp => "yelp",
            Platform::Facebook => "facebook",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "google" => Ok(Platform::Google),
            "yelp" => Ok(Platform::Yelp),
            "facebook" => Ok(Platform::Facebook),
            other => Err(Error::InvalidInput(format!("Unknown platform: {}", other))),
        }
    }
}

/// Subscription lifecycle of a business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("Unknown subscription status: {}", other))),
        }
    }
}

/// A subscribed business and its SMS routing flags
#[derive(Debug, Clone)]
pub struct Business {
    pub guid: Uuid,
    pub name: String,
    pub owner_phone: String,
    /// When set, non-negative non-escalated drafts skip SMS approval
    pub auto_approve: bool,
    pub monitoring_paused: bool,
    pub sms_opt_out: bool,
    pub subscription_status: SubscriptionStatus,
}

/// Credential health of a connected platform listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsStatus {
    Active,
    Revoked,
}

impl CredentialsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialsStatus::Active => "active",
            CredentialsStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(CredentialsStatus::Active),
            "revoked" => Ok(CredentialsStatus::Revoked),
            other => Err(Error::InvalidInput(format!("Unknown credentials status: {}", other))),
        }
    }
}

/// One connected platform listing for a business
#[derive(Debug, Clone)]
pub struct ReviewSourceRecord {
    pub guid: Uuid,
    pub business_id: Uuid,
    pub platform: Platform,
    pub external_source_id: String,
    pub credentials_status: CredentialsStatus,
    pub last_polled_at: Option<DateTime<Utc>>,
}

/// Sentiment label produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(Error::InvalidInput(format!("Unknown sentiment: {}", other))),
        }
    }
}

/// A stored review; immutable once created
#[derive(Debug, Clone)]
pub struct Review {
    pub guid: Uuid,
    pub business_id: Uuid,
    pub platform: Platform,
    pub external_review_id: String,
    pub rating: i64,
    pub author_name: Option<String>,
    pub text: String,
    pub review_date: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub sentiment_score: f64,
    pub metadata: serde_json::Value,
}

/// Approval lifecycle of a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Sent,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Pending => "pending",
            DraftStatus::Approved => "approved",
            DraftStatus::Rejected => "rejected",
            DraftStatus::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(DraftStatus::Pending),
            "approved" => Ok(DraftStatus::Approved),
            "rejected" => Ok(DraftStatus::Rejected),
            "sent" => Ok(DraftStatus::Sent),
            other => Err(Error::InvalidInput(format!("Unknown draft status: {}", other))),
        }
    }
}

/// A generated candidate reply carrying its own approval lifecycle
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    pub guid: Uuid,
    pub review_id: Uuid,
    pub text: String,
    pub status: DraftStatus,
    pub escalation: bool,
    pub escalation_reasons: Vec<String>,
    pub confidence: f64,
    pub failure_detail: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Conversation state for one phone number
///
/// Closed enum; the schema CHECK clause mirrors these four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingCustomReply,
    AwaitingCancelConfirm,
    AwaitingCompetitorAdd,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingCustomReply => "awaiting_custom_reply",
            ConversationState::AwaitingCancelConfirm => "awaiting_cancel_confirm",
            ConversationState::AwaitingCompetitorAdd => "awaiting_competitor_add",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(ConversationState::Idle),
            "awaiting_custom_reply" => Ok(ConversationState::AwaitingCustomReply),
            "awaiting_cancel_confirm" => Ok(ConversationState::AwaitingCancelConfirm),
            "awaiting_competitor_add" => Ok(ConversationState::AwaitingCompetitorAdd),
            other => Err(Error::InvalidInput(format!("Unknown conversation state: {}", other))),
        }
    }
}

/// Per-phone conversation context; created lazily, never deleted
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub phone: String,
    pub business_id: Uuid,
    pub state: ConversationState,
    pub pending_review_id: Option<Uuid>,
}

/// Retry-state record for a failed review alert
#[derive(Debug, Clone)]
pub struct RetryRecord {
    pub notification_id: Uuid,
    pub review_id: Uuid,
    pub attempt_count: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub terminal: bool,
    pub last_error: Option<String>,
}

/// A review as returned by a platform adapter, before storage
#[derive(Debug, Clone, Deserialize)]
pub struct RawReview {
    pub external_id: String,
    pub rating: i64,
    pub author_name: Option<String>,
    pub text: String,
    pub review_date: DateTime<Utc>,
}

/// Output of the reply generator collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyOutput {
    pub draft_text: String,
    #[serde(default)]
    pub escalation: bool,
    #[serde(default)]
    pub escalation_reasons: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}
