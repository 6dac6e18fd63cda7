//! Owner notification dispatch
//!
//! Formats and sends the new-review alert SMS. The conversation context is
//! pointed at the review BEFORE the gateway send, so a reply arriving
//! concurrently with send-completion still resolves against the right
//! review. Every attempt is logged; gateway failures propagate to the
//! caller after logging so the retry subsystem can take over.

use crate::db;
use crate::models::{Business, ReplyDraft, Review};
use crate::services::gateway::{GatewayError, SmsGateway};
use replyq_common::events::{EventBus, ReplyqEvent};
use replyq_common::Error;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const COMMAND_HINT: &str = "Reply APPROVE to post, EDIT to write your own, IGNORE to skip. HELP for more options.";

const DEFAULT_QUOTE_MAX_CHARS: i64 = 120;
const DEFAULT_DRAFT_MAX_CHARS: i64 = 300;

/// Dispatch failure carrying the log entry that recorded the attempt
#[derive(Debug)]
pub enum DispatchError {
    /// The gateway send failed; the attempt is already logged under
    /// `notification_id` and is eligible for retry scheduling
    Send {
        notification_id: Uuid,
        source: GatewayError,
    },
    /// Database failure before or around the send; nothing was logged
    Db(Error),
}

impl From<Error> for DispatchError {
    fn from(e: Error) -> Self {
        DispatchError::Db(e)
    }
}

/// Sends the new-review alert SMS to the business owner
pub struct NotificationDispatcher {
    db: SqlitePool,
    event_bus: EventBus,
    gateway: Arc<dyn SmsGateway>,
}

impl NotificationDispatcher {
    pub fn new(db: SqlitePool, event_bus: EventBus, gateway: Arc<dyn SmsGateway>) -> Self {
        Self {
            db,
            event_bus,
            gateway,
        }
    }

    /// Send the alert for a new review+draft pair; returns the outbound
    /// notification log id
    pub async fn send(
        &self,
        review: &Review,
        draft: &ReplyDraft,
        business: &Business,
    ) -> std::result::Result<Uuid, DispatchError> {
        let quote_max =
            db::settings::get_i64(&self.db, "sms_review_quote_max_chars", DEFAULT_QUOTE_MAX_CHARS)
                .await? as usize;
        let draft_max =
            db::settings::get_i64(&self.db, "sms_draft_max_chars", DEFAULT_DRAFT_MAX_CHARS).await?
                as usize;

        let body = format_alert(review, draft, business, quote_max, draft_max);
        let phone = business.owner_phone.as_str();

        // Context first: a reply racing the send must still find the review
        db::conversations::point_at_review(&self.db, phone, business.guid, review.guid).await?;

        match self.gateway.send_sms(phone, &body).await {
            Ok(message_id) => {
                let notification_id =
                    db::notifications::log_outbound(&self.db, phone, &body, Some(&message_id), "sent")
                        .await?;

                self.event_bus.emit_lossy(ReplyqEvent::NotificationSent {
                    notification_id,
                    review_id: review.guid,
                    phone: phone.to_string(),
                    timestamp: chrono::Utc::now(),
                });

                tracing::info!(
                    review_id = %review.guid,
                    notification_id = %notification_id,
                    "Owner alert sent"
                );

                Ok(notification_id)
            }
            Err(e) => {
                let notification_id =
                    db::notifications::log_outbound(&self.db, phone, &body, None, "failed").await?;

                tracing::warn!(
                    review_id = %review.guid,
                    notification_id = %notification_id,
                    error = %e,
                    "Owner alert failed"
                );

                Err(DispatchError::Send {
                    notification_id,
                    source: e,
                })
            }
        }
    }

}

/// Build the bounded-length alert body
fn format_alert(
    review: &Review,
    draft: &ReplyDraft,
    business: &Business,
    quote_max: usize,
    draft_max: usize,
) -> String {
    let stars = "*".repeat(review.rating.clamp(1, 5) as usize);
    let author = review.author_name.as_deref().unwrap_or("A customer");
    let quote = truncate_chars(&review.text, quote_max);
    let draft_text = truncate_chars(&draft.text, draft_max);

    let escalation_note = if draft.escalation {
        "\nNeeds careful wording: sensitive topics detected."
    } else {
        ""
    };

    format!(
        "New {} review for {}\n{} by {}: \"{}\"{}\n\nSuggested reply: {}\n\n{}",
        review.platform.as_str(),
        business.name,
        stars,
        author,
        quote,
        escalation_note,
        draft_text,
        COMMAND_HINT
    )
}

/// Truncate on a character boundary, appending an ellipsis when shortened
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DraftStatus, Platform, Sentiment, SubscriptionStatus};
    use chrono::Utc;

    fn sample_review(text: &str) -> Review {
        Review {
            guid: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            platform: Platform::Google,
            external_review_id: "ext-1".to_string(),
            rating: 2,
            author_name: Some("Dana".to_string()),
            text: text.to_string(),
            review_date: Utc::now(),
            sentiment: Sentiment::Negative,
            sentiment_score: -0.5,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    fn sample_draft(text: &str, escalation: bool) -> ReplyDraft {
        ReplyDraft {
            guid: Uuid::new_v4(),
            review_id: Uuid::new_v4(),
            text: text.to_string(),
            status: DraftStatus::Pending,
            escalation,
            escalation_reasons: vec![],
            confidence: 0.9,
            failure_detail: None,
            approved_at: None,
        }
    }

    fn sample_business() -> Business {
        Business {
            guid: Uuid::new_v4(),
            name: "Corner Cafe".to_string(),
            owner_phone: "+15550000001".to_string(),
            auto_approve: false,
            monitoring_paused: false,
            sms_opt_out: false,
            subscription_status: SubscriptionStatus::Active,
        }
    }

    #[test]
    fn truncate_leaves_short_strings_alone() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld, this is a long review body";
        let out = truncate_chars(s, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn alert_contains_quote_draft_and_hint() {
        let review = sample_review("The soup was cold and the service was slow.");
        let draft = sample_draft("We're sorry to hear that, Dana.", false);
        let business = sample_business();

        let body = format_alert(&review, &draft, &business, 120, 300);

        assert!(body.contains("Corner Cafe"));
        assert!(body.contains("The soup was cold"));
        assert!(body.contains("We're sorry to hear that"));
        assert!(body.contains("Reply APPROVE"));
        assert!(body.contains("**"));
    }

    #[test]
    fn alert_bounds_quote_and_draft_length() {
        let long_review = "x".repeat(500);
        let long_draft = "y".repeat(900);
        let review = sample_review(&long_review);
        let draft = sample_draft(&long_draft, false);
        let business = sample_business();

        let body = format_alert(&review, &draft, &business, 120, 300);

        let quoted: String = body
            .split('"')
            .nth(1)
            .unwrap_or_default()
            .to_string();
        assert!(quoted.chars().count() <= 120);
        assert!(!body.contains(&"y".repeat(301)));
    }

    #[test]
    fn escalated_draft_carries_warning() {
        let review = sample_review("I got food poisoning");
        let draft = sample_draft("We take this seriously.", true);
        let business = sample_business();

        let body = format_alert(&review, &draft, &business, 120, 300);
        assert!(body.contains("sensitive topics"));
    }
}
