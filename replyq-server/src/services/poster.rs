//! Response posting reconciliation
//!
//! Periodic sweep that publishes approved drafts back to their platform.
//! The posted_responses anti-join is the idempotency guard: a draft posts
//! at most once no matter how often the sweep runs. Failures leave the
//! draft approved so the next sweep retries unconditionally (deliberately
//! no backoff here, unlike the notification retry path).

use crate::db;
use crate::models::{CredentialsStatus, Platform, ReplyDraft};
use crate::services::platform::{PlatformPoster, PostError};
use replyq_common::events::{EventBus, ReplyqEvent};
use replyq_common::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_BATCH_SIZE: i64 = 10;

/// Sweep counters
#[derive(Debug, Default, Clone, Copy)]
pub struct PostStats {
    pub examined: usize,
    pub posted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Posts approved drafts to their originating platform
pub struct ResponsePoster {
    db: SqlitePool,
    event_bus: EventBus,
    poster: Arc<dyn PlatformPoster>,
}

impl ResponsePoster {
    pub fn new(db: SqlitePool, event_bus: EventBus, poster: Arc<dyn PlatformPoster>) -> Self {
        Self {
            db,
            event_bus,
            poster,
        }
    }

    /// Run one posting sweep over approved, not-yet-posted drafts
    pub async fn run_sweep(&self) -> Result<PostStats> {
        let batch_size =
            db::settings::get_i64(&self.db, "post_batch_size", DEFAULT_BATCH_SIZE).await?;

        let batch = db::drafts::approved_unposted(&self.db, batch_size).await?;

        let mut stats = PostStats {
            examined: batch.len(),
            ..Default::default()
        };

        for (draft, business_id, platform, external_review_id) in batch {
            // Revoked platform credentials require out-of-band
            // re-authorization; retrying would only burn quota
            if let Some(source) = db::sources::find(&self.db, business_id, platform).await? {
                if source.credentials_status == CredentialsStatus::Revoked {
                    stats.skipped += 1;
                    tracing::debug!(
                        draft_id = %draft.guid,
                        platform = platform.as_str(),
                        "Skipping draft; source credentials revoked"
                    );
                    continue;
                }
            }

            match self
                .post_one(&draft, business_id, platform, &external_review_id)
                .await
            {
                Ok(()) => stats.posted += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        draft_id = %draft.guid,
                        error = %e,
                        "Posting failed; draft stays approved for next sweep"
                    );
                }
            }
        }

        if stats.examined > 0 {
            tracing::info!(
                examined = stats.examined,
                posted = stats.posted,
                failed = stats.failed,
                skipped = stats.skipped,
                "Response posting sweep complete"
            );
        }

        Ok(stats)
    }

    async fn post_one(
        &self,
        draft: &ReplyDraft,
        business_id: Uuid,
        platform: Platform,
        external_review_id: &str,
    ) -> Result<()> {
        let text = extract_response_text(&draft.text);

        match self
            .poster
            .post_reply(platform, external_review_id, &text)
            .await
        {
            Ok(posted) => {
                let now = chrono::Utc::now();

                // Marker and status flip commit together
                let mut tx = self.db.begin().await?;
                let insert_result = async {
                    db::posted::insert(
                        &mut *tx,
                        draft.guid,
                        draft.review_id,
                        platform,
                        posted.platform_reply_id.as_deref(),
                        now,
                    )
                    .await?;
                    db::drafts::mark_sent(&mut *tx, draft.guid).await?;
                    Ok::<(), Error>(())
                }
                .await;

                match insert_result {
                    Ok(()) => tx.commit().await?,
                    Err(e) if e.is_unique_violation() => {
                        // A concurrent sweep already recorded this draft
                        tx.rollback().await?;
                        tracing::debug!(draft_id = %draft.guid, "Draft already posted; skipping");
                        return Ok(());
                    }
                    Err(e) => {
                        tx.rollback().await?;
                        return Err(e);
                    }
                }

                self.event_bus.emit_lossy(ReplyqEvent::ResponsePosted {
                    draft_id: draft.guid,
                    review_id: draft.review_id,
                    platform: platform.as_str().to_string(),
                    timestamp: now,
                });

                tracing::info!(
                    draft_id = %draft.guid,
                    platform = platform.as_str(),
                    "Reply posted"
                );

                Ok(())
            }
            Err(e) => {
                if matches!(e, PostError::CredentialsRevoked(_)) {
                    if let Some(source) = db::sources::find(&self.db, business_id, platform).await?
                    {
                        db::sources::mark_revoked(&self.db, source.guid).await?;
                    }
                }

                // Failure detail is observability only; the approved status
                // itself is what keeps the draft in the sweep
                db::drafts::record_failure(&self.db, draft.guid, &e.to_string()).await?;

                self.event_bus.emit_lossy(ReplyqEvent::ResponsePostFailed {
                    draft_id: draft.guid,
                    review_id: draft.review_id,
                    error: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });

                Err(Error::External(e.to_string()))
            }
        }
    }
}

/// Extract the text to actually post
///
/// Generated drafts sometimes contain multiple labeled options
/// ("Option 1: ..."). The first option's content is used; drafts without
/// option labels post as-is.
pub fn extract_response_text(draft: &str) -> String {
    let lines: Vec<&str> = draft.lines().collect();

    let is_option_label = |line: &str| {
        let lowered = line.trim().to_lowercase();
        lowered.starts_with("option") && lowered.contains(':')
    };

    let Some(first_label) = lines.iter().position(|l| is_option_label(l)) else {
        return draft.trim().to_string();
    };

    let mut collected = Vec::new();

    // Text after the colon on the label line itself
    if let Some((_, rest)) = lines[first_label].split_once(':') {
        if !rest.trim().is_empty() {
            collected.push(rest.trim().to_string());
        }
    }

    // Subsequent lines until the next option label
    for line in &lines[first_label + 1..] {
        if is_option_label(line) {
            break;
        }
        collected.push(line.trim().to_string());
    }

    let text = collected.join("\n");
    text.trim().to_string()
}
