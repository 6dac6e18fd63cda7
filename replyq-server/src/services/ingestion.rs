//! Review ingestion coordination
//!
//! fetch → dedup → transactional persist of review+draft → post-commit
//! owner alert. Businesses and their sources are processed sequentially
//! within one cycle; a source that fails is logged and skipped without
//! aborting the rest of the run.

use crate::db;
use crate::models::{
    Business, CredentialsStatus, DraftStatus, RawReview, ReplyDraft, Review, ReviewSourceRecord,
    Sentiment,
};
use crate::services::generator::ReplyGenerator;
use crate::services::notifier::{DispatchError, NotificationDispatcher};
use crate::services::sentiment::SentimentClassifier;
use crate::services::sources::{ReviewSource, SourceError};
use replyq_common::events::{EventBus, ReplyqEvent};
use replyq_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Per-source ingestion counters
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub fetched: usize,
    pub skipped: usize,
    pub stored: usize,
    pub auto_approved: usize,
    pub alerts_failed: usize,
}

/// Whole-cycle counters
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub businesses: usize,
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub stored: usize,
}

/// Orchestrates the fetch → dedup → persist → alert pipeline
pub struct IngestionCoordinator {
    db: SqlitePool,
    event_bus: EventBus,
    classifier: SentimentClassifier,
    source_client: Arc<dyn ReviewSource>,
    generator: Arc<dyn ReplyGenerator>,
    notifier: Arc<NotificationDispatcher>,
}

impl IngestionCoordinator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        source_client: Arc<dyn ReviewSource>,
        generator: Arc<dyn ReplyGenerator>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            event_bus,
            classifier: SentimentClassifier::new(),
            source_client,
            generator,
            notifier,
        }
    }

    /// Run one full ingestion cycle over every pollable business
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let businesses = db::businesses::list_pollable(&self.db).await?;
        let mut cycle = CycleStats {
            businesses: businesses.len(),
            ..Default::default()
        };

        for business in &businesses {
            let sources = db::sources::list_for_business(&self.db, business.guid).await?;

            for source in &sources {
                if source.credentials_status == CredentialsStatus::Revoked {
                    tracing::debug!(source_id = %source.guid, "Skipping revoked source");
                    continue;
                }

                match self.ingest_source(business, source).await {
                    Ok(stats) => {
                        cycle.sources_polled += 1;
                        cycle.stored += stats.stored;
                    }
                    Err(e) => {
                        // One broken source must not starve the rest of
                        // the run
                        cycle.sources_failed += 1;
                        tracing::warn!(
                            business_id = %business.guid,
                            source_id = %source.guid,
                            error = %e,
                            "Source fetch failed; continuing with remaining sources"
                        );
                    }
                }
            }
        }

        tracing::info!(
            businesses = cycle.businesses,
            sources_polled = cycle.sources_polled,
            sources_failed = cycle.sources_failed,
            stored = cycle.stored,
            "Ingestion cycle complete"
        );

        Ok(cycle)
    }

    /// Ingest one source for one business
    pub async fn ingest_source(
        &self,
        business: &Business,
        source: &ReviewSourceRecord,
    ) -> Result<IngestStats> {
        let since = db::reviews::watermark(&self.db, business.guid, source.platform).await?;

        let raw_reviews = match self.source_client.fetch_reviews(source, since).await {
            Ok(reviews) => reviews,
            Err(SourceError::CredentialsRevoked(_)) => {
                // Irrecoverable until the owner re-authorizes; surfaced via
                // the STATUS command rather than retried
                db::sources::mark_revoked(&self.db, source.guid).await?;
                tracing::warn!(
                    source_id = %source.guid,
                    "Source credentials revoked; marked for re-authorization"
                );
                return Err(Error::External(format!(
                    "Credentials revoked for source {}",
                    source.external_source_id
                )));
            }
            Err(e) => return Err(Error::External(e.to_string())),
        };

        let mut stats = IngestStats {
            fetched: raw_reviews.len(),
            ..Default::default()
        };

        // Source-return order is preserved; the next review is not touched
        // until this one's transaction and alert attempt are resolved
        for raw in &raw_reviews {
            match self.process_raw(business, source, raw).await? {
                RawOutcome::Skipped => stats.skipped += 1,
                RawOutcome::Stored { auto_approved, alert_failed } => {
                    stats.stored += 1;
                    if auto_approved {
                        stats.auto_approved += 1;
                    }
                    if alert_failed {
                        stats.alerts_failed += 1;
                    }
                }
            }
        }

        db::sources::set_last_polled(&self.db, source.guid, chrono::Utc::now()).await?;

        tracing::info!(
            source_id = %source.guid,
            platform = source.platform.as_str(),
            fetched = stats.fetched,
            stored = stats.stored,
            skipped = stats.skipped,
            "Source ingested"
        );

        Ok(stats)
    }

    async fn process_raw(
        &self,
        business: &Business,
        source: &ReviewSourceRecord,
        raw: &RawReview,
    ) -> Result<RawOutcome> {
        // Steady-state dedup: sources return a sliding window, so most
        // items in a poll have already been stored
        if db::reviews::exists(&self.db, source.platform, &raw.external_id).await? {
            return Ok(RawOutcome::Skipped);
        }

        if !(1..=5).contains(&raw.rating) {
            tracing::warn!(
                external_id = %raw.external_id,
                rating = raw.rating,
                "Dropping review with out-of-range rating"
            );
            return Ok(RawOutcome::Skipped);
        }

        let classification = self.classifier.classify(raw.rating, &raw.text);

        let review = Review {
            guid: Uuid::new_v4(),
            business_id: business.guid,
            platform: source.platform,
            external_review_id: raw.external_id.clone(),
            rating: raw.rating,
            author_name: raw.author_name.clone(),
            text: raw.text.clone(),
            review_date: raw.review_date,
            sentiment: classification.sentiment,
            sentiment_score: classification.score,
            metadata: serde_json::json!({
                "source_id": source.guid,
                "positive_signals": classification.positive_signals,
                "negative_signals": classification.negative_signals,
            }),
        };

        // External draft generation happens before the write transaction
        // opens, so the SQLite write lock is held only for the two inserts.
        // A generation failure leaves no review behind; the next poll's
        // window retries this item.
        let output = match self.generator.generate_reply(&review, business).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    external_id = %raw.external_id,
                    error = %e,
                    "Reply generation failed; review deferred to next cycle"
                );
                return Ok(RawOutcome::Skipped);
            }
        };

        // Escalation is the union of the keyword scan and the generator's
        // own judgement
        let mut escalation_reasons: Vec<String> = self
            .classifier
            .escalation_reasons(&raw.text)
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();
        for reason in &output.escalation_reasons {
            if !escalation_reasons.contains(reason) {
                escalation_reasons.push(reason.clone());
            }
        }
        let escalation = output.escalation || !escalation_reasons.is_empty();

        // Auto-post policy: opt-in per business, and only for reviews that
        // are neither negative nor escalated; everything else routes to
        // SMS approval
        let auto_approved =
            business.auto_approve && !escalation && review.sentiment != Sentiment::Negative;

        let now = chrono::Utc::now();
        let draft = ReplyDraft {
            guid: Uuid::new_v4(),
            review_id: review.guid,
            text: output.draft_text,
            status: if auto_approved {
                DraftStatus::Approved
            } else {
                DraftStatus::Pending
            },
            escalation,
            escalation_reasons,
            confidence: output.confidence.clamp(0.0, 1.0),
            failure_detail: None,
            approved_at: auto_approved.then_some(now),
        };

        // Review and draft commit or roll back together
        let mut tx = self.db.begin().await?;
        let insert_result = async {
            db::reviews::insert(&mut *tx, &review).await?;
            db::drafts::insert(&mut *tx, &draft).await?;
            Ok::<(), Error>(())
        }
        .await;

        match insert_result {
            Ok(()) => tx.commit().await?,
            Err(e) if e.is_unique_violation() => {
                // Lost a race with a concurrent ingest of the same item;
                // the other writer's row is the canonical one
                tx.rollback().await?;
                tracing::debug!(
                    external_id = %raw.external_id,
                    "Duplicate insert race resolved as skip"
                );
                return Ok(RawOutcome::Skipped);
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        }

        self.event_bus.emit_lossy(ReplyqEvent::ReviewIngested {
            review_id: review.guid,
            business_id: business.guid,
            platform: review.platform.as_str().to_string(),
            sentiment: review.sentiment.as_str().to_string(),
            escalation,
            timestamp: now,
        });

        // The alert is a side effect on an external channel; the review and
        // draft above are already durable, so a failed send is recorded for
        // retry instead of rolled back
        let mut alert_failed = false;
        if !auto_approved && !business.sms_opt_out {
            match self.notifier.send(&review, &draft, business).await {
                Ok(_) => {}
                Err(DispatchError::Send {
                    notification_id,
                    source: send_err,
                }) => {
                    alert_failed = true;
                    db::retries::schedule(
                        &self.db,
                        notification_id,
                        review.guid,
                        chrono::Utc::now(),
                        &send_err.to_string(),
                    )
                    .await?;

                    self.event_bus.emit_lossy(ReplyqEvent::NotificationFailed {
                        notification_id,
                        review_id: review.guid,
                        attempt_count: 0,
                        terminal: false,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(DispatchError::Db(e)) => {
                    alert_failed = true;
                    tracing::error!(
                        review_id = %review.guid,
                        error = %e,
                        "Alert bookkeeping failed; review stored without retry record"
                    );
                }
            }
        }

        Ok(RawOutcome::Stored {
            auto_approved,
            alert_failed,
        })
    }
}

enum RawOutcome {
    Skipped,
    Stored {
        auto_approved: bool,
        alert_failed: bool,
    },
}
