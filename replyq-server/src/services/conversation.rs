//! SMS conversation state machine
//!
//! Interprets inbound SMS against per-phone conversation state, executes
//! the matching action, and returns the outbound reply text. The owner
//! always gets a deterministic, templated message back, including on
//! internal errors; the conversational channel never hangs.
//!
//! Invariant: every handler that transitions out of a waiting state also
//! clears or re-homes the field that made that state reachable, so a
//! context can never be stuck expecting input for a review that has
//! already been resolved.

use crate::db;
use crate::models::{
    Business, ConversationContext, ConversationState, SubscriptionStatus,
};
use crate::services::billing::BillingPortal;
use crate::services::command::{self, Command};
use replyq_common::events::{EventBus, ReplyqEvent};
use replyq_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Deterministic reply for internal failures
pub const FALLBACK_REPLY: &str =
    "Something went wrong on our end. Please try again in a moment.";

const NOTHING_PENDING_REPLY: &str = "There's no review waiting for a decision right now.";

const UNKNOWN_REPLY: &str = "Sorry, I didn't catch that. Text HELP for the list of commands.";

const HELP_REPLY: &str = "Commands: APPROVE post the suggested reply. EDIT write your own. \
                          IGNORE skip this review. STATUS account summary. PAUSE / RESUME alerts. \
                          COMPETITOR ADD <name> watch a competitor. BILLING manage billing. \
                          CANCEL end subscription. STOP opt out.";

const UNREGISTERED_REPLY: &str =
    "This phone number isn't linked to a ReplyQ account.";

/// Outcome of processing one inbound SMS
#[derive(Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Reply to send back through the gateway markup
    Reply(String),
    /// Duplicate gateway message id; already processed, nothing to do
    Duplicate,
}

/// Per-phone conversational command processor
pub struct ConversationStateMachine {
    db: SqlitePool,
    event_bus: EventBus,
    billing: Arc<dyn BillingPortal>,
}

impl ConversationStateMachine {
    pub fn new(db: SqlitePool, event_bus: EventBus, billing: Arc<dyn BillingPortal>) -> Self {
        Self {
            db,
            event_bus,
            billing,
        }
    }

    /// Process one inbound SMS end to end
    ///
    /// Duplicate gateway message ids are an idempotent no-op. All internal
    /// errors collapse to the fallback reply; no state is mutated on
    /// malformed input.
    pub async fn handle_inbound(
        &self,
        phone: &str,
        body: &str,
        gateway_message_id: &str,
    ) -> InboundOutcome {
        match self.process(phone, body, gateway_message_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(phone = %phone, error = %e, "Inbound SMS processing failed");
                InboundOutcome::Reply(FALLBACK_REPLY.to_string())
            }
        }
    }

    async fn process(
        &self,
        phone: &str,
        body: &str,
        gateway_message_id: &str,
    ) -> Result<InboundOutcome> {
        if db::notifications::inbound_exists(&self.db, gateway_message_id).await? {
            tracing::info!(
                gateway_message_id = %gateway_message_id,
                "Duplicate inbound delivery ignored"
            );
            return Ok(InboundOutcome::Duplicate);
        }

        let Some(business) = db::businesses::find_by_owner_phone(&self.db, phone).await? else {
            db::notifications::log_inbound(&self.db, phone, body, "UNREGISTERED", gateway_message_id)
                .await?;
            return Ok(InboundOutcome::Reply(UNREGISTERED_REPLY.to_string()));
        };

        // Context is created lazily on first inbound SMS
        let context = match db::conversations::get(&self.db, phone).await? {
            Some(context) => context,
            None => db::conversations::create_idle(&self.db, phone, business.guid).await?,
        };

        let cmd = command::parse(body, context.state);

        db::notifications::log_inbound(&self.db, phone, body, cmd.label(), gateway_message_id)
            .await?;

        tracing::info!(
            phone = %phone,
            state = context.state.as_str(),
            command = cmd.label(),
            "Processing owner command"
        );

        let reply = self.execute(&business, &context, cmd).await?;
        Ok(InboundOutcome::Reply(reply))
    }

    async fn execute(
        &self,
        business: &Business,
        context: &ConversationContext,
        cmd: Command,
    ) -> Result<String> {
        match cmd {
            Command::Approve => self.approve_pending(context).await,
            Command::Edit => self.prompt_for_edit(context).await,
            Command::Ignore => self.ignore_pending(context).await,
            Command::CustomReply(text) => self.apply_custom_reply(context, &text).await,
            Command::Cancel => self.prompt_cancel_confirm(context).await,
            Command::CancelConfirm => self.confirm_cancel(business, context).await,
            Command::CancelDeny => self.deny_cancel(context).await,
            Command::Pause => self.pause_monitoring(business).await,
            Command::Resume => self.resume_monitoring(business).await,
            Command::Status => self.report_status(business).await,
            Command::Billing => self.billing_link(business).await,
            Command::Help => Ok(HELP_REPLY.to_string()),
            Command::Stop => self.opt_out(business, context).await,
            Command::CompetitorAdd(Some(name)) => self.add_competitor(business, context, &name).await,
            Command::CompetitorAdd(None) => self.prompt_competitor_name(context).await,
            Command::CompetitorName(name) => self.add_competitor(business, context, &name).await,
            Command::Unknown => Ok(UNKNOWN_REPLY.to_string()),
        }
    }

    async fn approve_pending(&self, context: &ConversationContext) -> Result<String> {
        let Some(review_id) = context.pending_review_id else {
            return Ok(NOTHING_PENDING_REPLY.to_string());
        };

        let review = db::reviews::get(&self.db, review_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Pending review {}", review_id)))?;
        let draft = db::drafts::latest_for_review(&self.db, review_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Draft for review {}", review_id)))?;

        db::drafts::approve(&self.db, draft.guid, chrono::Utc::now()).await?;
        db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
            .await?;

        self.event_bus.emit_lossy(ReplyqEvent::DraftApproved {
            draft_id: draft.guid,
            review_id,
            custom_text: false,
            timestamp: chrono::Utc::now(),
        });

        Ok(format!(
            "Approved. Your reply will be posted to {} shortly.",
            review.platform.as_str()
        ))
    }

    async fn prompt_for_edit(&self, context: &ConversationContext) -> Result<String> {
        let Some(review_id) = context.pending_review_id else {
            return Ok(NOTHING_PENDING_REPLY.to_string());
        };

        db::conversations::set_state(
            &self.db,
            &context.phone,
            ConversationState::AwaitingCustomReply,
            Some(review_id),
        )
        .await?;

        Ok("Text your reply now and it will be posted word-for-word. Or IGNORE to skip this review.".to_string())
    }

    async fn ignore_pending(&self, context: &ConversationContext) -> Result<String> {
        let Some(review_id) = context.pending_review_id else {
            // IGNORE can arrive as an override from a waiting state; make
            // sure the context lands back in idle either way
            if context.state != ConversationState::Idle {
                db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
                    .await?;
            }
            return Ok(NOTHING_PENDING_REPLY.to_string());
        };

        let draft = db::drafts::latest_for_review(&self.db, review_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Draft for review {}", review_id)))?;

        db::drafts::reject(&self.db, draft.guid).await?;
        db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
            .await?;

        self.event_bus.emit_lossy(ReplyqEvent::DraftRejected {
            draft_id: draft.guid,
            review_id,
            timestamp: chrono::Utc::now(),
        });

        Ok("Skipped. No reply will be posted for this review.".to_string())
    }

    async fn apply_custom_reply(&self, context: &ConversationContext, text: &str) -> Result<String> {
        let Some(review_id) = context.pending_review_id else {
            // Waiting state with nothing to wait on; reset rather than trap
            // the owner in a dead prompt
            db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
                .await?;
            return Ok(NOTHING_PENDING_REPLY.to_string());
        };

        let draft = db::drafts::latest_for_review(&self.db, review_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Draft for review {}", review_id)))?;

        db::drafts::approve_with_text(&self.db, draft.guid, text, chrono::Utc::now()).await?;
        db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
            .await?;

        self.event_bus.emit_lossy(ReplyqEvent::DraftApproved {
            draft_id: draft.guid,
            review_id,
            custom_text: true,
            timestamp: chrono::Utc::now(),
        });

        Ok("Got it. Your reply is saved and will be posted shortly.".to_string())
    }

    async fn prompt_cancel_confirm(&self, context: &ConversationContext) -> Result<String> {
        // Keep any pending review pointer; an aborted cancel flow must not
        // lose the review awaiting a decision
        db::conversations::set_state(
            &self.db,
            &context.phone,
            ConversationState::AwaitingCancelConfirm,
            context.pending_review_id,
        )
        .await?;

        Ok("This will cancel your subscription. Reply YES to confirm or NO to keep your account.".to_string())
    }

    async fn confirm_cancel(
        &self,
        business: &Business,
        context: &ConversationContext,
    ) -> Result<String> {
        match self.billing.cancel_subscription(business).await {
            Ok(()) => {
                // Local cancel state is only persisted after the external
                // call succeeds
                db::businesses::set_subscription_status(
                    &self.db,
                    business.guid,
                    SubscriptionStatus::Cancelled,
                )
                .await?;
                db::businesses::set_monitoring_paused(&self.db, business.guid, true).await?;
                db::conversations::set_state(
                    &self.db,
                    &context.phone,
                    ConversationState::Idle,
                    context.pending_review_id,
                )
                .await?;

                self.event_bus.emit_lossy(ReplyqEvent::SubscriptionCancelled {
                    business_id: business.guid,
                    timestamp: chrono::Utc::now(),
                });

                Ok("Your subscription is cancelled and review monitoring has stopped. Sorry to see you go.".to_string())
            }
            Err(e) => {
                tracing::error!(
                    business_id = %business.guid,
                    error = %e,
                    "Billing cancellation failed; no local state changed"
                );
                db::conversations::set_state(
                    &self.db,
                    &context.phone,
                    ConversationState::Idle,
                    context.pending_review_id,
                )
                .await?;

                Ok("We couldn't reach billing just now, so nothing was changed. Text CANCEL to try again.".to_string())
            }
        }
    }

    async fn deny_cancel(&self, context: &ConversationContext) -> Result<String> {
        db::conversations::set_state(
            &self.db,
            &context.phone,
            ConversationState::Idle,
            context.pending_review_id,
        )
        .await?;

        Ok("No changes made. Your subscription continues.".to_string())
    }

    async fn pause_monitoring(&self, business: &Business) -> Result<String> {
        db::businesses::set_monitoring_paused(&self.db, business.guid, true).await?;
        Ok("Review monitoring paused. Text RESUME to pick back up.".to_string())
    }

    async fn resume_monitoring(&self, business: &Business) -> Result<String> {
        db::businesses::resume(&self.db, business.guid).await?;
        Ok("Review monitoring resumed. New reviews will come through here.".to_string())
    }

    async fn report_status(&self, business: &Business) -> Result<String> {
        let pending = db::drafts::pending_count_for_business(&self.db, business.guid).await?;
        let sources = db::sources::list_for_business(&self.db, business.guid).await?;

        let mut lines = vec![format!(
            "{}: subscription {}, {} review(s) awaiting your decision.",
            business.name,
            business.subscription_status.as_str(),
            pending
        )];

        if business.monitoring_paused {
            lines.push("Monitoring is paused. Text RESUME to re-enable.".to_string());
        }

        for source in &sources {
            if source.credentials_status == crate::models::CredentialsStatus::Revoked {
                lines.push(format!(
                    "Your {} connection needs re-authorization from the dashboard.",
                    source.platform.as_str()
                ));
            }
        }

        Ok(lines.join(" "))
    }

    async fn billing_link(&self, business: &Business) -> Result<String> {
        match self.billing.portal_url(business).await {
            Ok(url) => Ok(format!("Manage your billing here: {}", url)),
            Err(e) => {
                tracing::warn!(business_id = %business.guid, error = %e, "Billing portal link failed");
                Ok("We couldn't fetch your billing link right now. Please try again shortly.".to_string())
            }
        }
    }

    async fn opt_out(&self, business: &Business, context: &ConversationContext) -> Result<String> {
        db::businesses::opt_out(&self.db, business.guid).await?;
        db::conversations::set_state(&self.db, &context.phone, ConversationState::Idle, None)
            .await?;

        Ok("You've been unsubscribed from ReplyQ alerts and monitoring is paused. Text RESUME to opt back in.".to_string())
    }

    async fn prompt_competitor_name(&self, context: &ConversationContext) -> Result<String> {
        db::conversations::set_state(
            &self.db,
            &context.phone,
            ConversationState::AwaitingCompetitorAdd,
            context.pending_review_id,
        )
        .await?;

        Ok("What's the name of the competitor you'd like to watch? Text it now.".to_string())
    }

    async fn add_competitor(
        &self,
        business: &Business,
        context: &ConversationContext,
        name: &str,
    ) -> Result<String> {
        db::competitors::insert(&self.db, business.guid, name).await?;

        if context.state != ConversationState::Idle {
            db::conversations::set_state(
                &self.db,
                &context.phone,
                ConversationState::Idle,
                context.pending_review_id,
            )
            .await?;
        }

        Ok(format!("Added {} to your competitor watch list.", name))
    }
}
