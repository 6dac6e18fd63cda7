//! Notification retry scheduling
//!
//! Periodic sweep over failed owner alerts with exponential backoff.
//! Backoff state lives in the dedicated notification_retries table; the
//! scheduler itself is stateless between runs.

use crate::db;
use crate::models::RetryRecord;
use crate::services::notifier::{DispatchError, NotificationDispatcher};
use replyq_common::events::{EventBus, ReplyqEvent};
use replyq_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

const DEFAULT_MAX_ATTEMPTS: i64 = 3;
const DEFAULT_BASE_DELAY_SECS: i64 = 300;
const DEFAULT_BATCH_SIZE: i64 = 20;

/// Sweep counters
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub examined: usize,
    pub resent: usize,
    pub rescheduled: usize,
    pub terminal: usize,
}

/// Re-attempts failed review alerts with exponential backoff
pub struct RetryScheduler {
    db: SqlitePool,
    event_bus: EventBus,
    notifier: Arc<NotificationDispatcher>,
}

impl RetryScheduler {
    pub fn new(db: SqlitePool, event_bus: EventBus, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            db,
            event_bus,
            notifier,
        }
    }

    /// Run one retry sweep
    ///
    /// Processes due records oldest-ingested-first in a bounded batch. On
    /// success all retry state is cleared; on failure the next attempt is
    /// pushed out by BASE_DELAY * 2^attempts, and MAX_ATTEMPTS failures
    /// park the record permanently.
    pub async fn run_sweep(&self) -> Result<SweepStats> {
        let max_attempts =
            db::settings::get_i64(&self.db, "retry_max_attempts", DEFAULT_MAX_ATTEMPTS).await?;
        let base_delay_secs =
            db::settings::get_i64(&self.db, "retry_base_delay_secs", DEFAULT_BASE_DELAY_SECS)
                .await?;
        let batch_size =
            db::settings::get_i64(&self.db, "retry_batch_size", DEFAULT_BATCH_SIZE).await?;

        let now = chrono::Utc::now();
        let due = db::retries::due(&self.db, now, max_attempts, batch_size).await?;

        let mut stats = SweepStats {
            examined: due.len(),
            ..Default::default()
        };

        for record in due {
            match self.retry_one(&record, max_attempts, base_delay_secs).await {
                Ok(RetryOutcome::Sent) => stats.resent += 1,
                Ok(RetryOutcome::Rescheduled) => stats.rescheduled += 1,
                Ok(RetryOutcome::Terminal) => stats.terminal += 1,
                Err(e) => {
                    tracing::error!(
                        notification_id = %record.notification_id,
                        error = %e,
                        "Retry attempt errored; record left for next sweep"
                    );
                }
            }
        }

        if stats.examined > 0 {
            tracing::info!(
                examined = stats.examined,
                resent = stats.resent,
                rescheduled = stats.rescheduled,
                terminal = stats.terminal,
                "Notification retry sweep complete"
            );
        }

        Ok(stats)
    }

    async fn retry_one(
        &self,
        record: &RetryRecord,
        max_attempts: i64,
        base_delay_secs: i64,
    ) -> Result<RetryOutcome> {
        // Re-resolve everything; the world may have changed since the
        // original failure
        let Some(review) = db::reviews::get(&self.db, record.review_id).await? else {
            db::retries::mark_terminal(
                &self.db,
                record.notification_id,
                record.attempt_count,
                "review no longer exists",
            )
            .await?;
            return Ok(RetryOutcome::Terminal);
        };

        let business = match db::businesses::get(&self.db, review.business_id).await? {
            Some(b) if !b.owner_phone.trim().is_empty() => b,
            _ => {
                db::retries::mark_terminal(
                    &self.db,
                    record.notification_id,
                    record.attempt_count,
                    "business or owner phone no longer available",
                )
                .await?;
                return Ok(RetryOutcome::Terminal);
            }
        };

        let Some(draft) = db::drafts::latest_for_review(&self.db, record.review_id).await? else {
            db::retries::mark_terminal(
                &self.db,
                record.notification_id,
                record.attempt_count,
                "draft no longer exists",
            )
            .await?;
            return Ok(RetryOutcome::Terminal);
        };

        match self.notifier.send(&review, &draft, &business).await {
            Ok(_) => {
                db::retries::clear(&self.db, record.notification_id).await?;
                tracing::info!(
                    notification_id = %record.notification_id,
                    review_id = %record.review_id,
                    "Alert resent; retry state cleared"
                );
                Ok(RetryOutcome::Sent)
            }
            Err(err) => {
                let detail = match &err {
                    DispatchError::Send { source, .. } => source.to_string(),
                    DispatchError::Db(e) => e.to_string(),
                };

                let attempts = record.attempt_count + 1;

                if attempts >= max_attempts {
                    db::retries::mark_terminal(
                        &self.db,
                        record.notification_id,
                        attempts,
                        &detail,
                    )
                    .await?;

                    self.event_bus.emit_lossy(ReplyqEvent::NotificationFailed {
                        notification_id: record.notification_id,
                        review_id: record.review_id,
                        attempt_count: attempts,
                        terminal: true,
                        timestamp: chrono::Utc::now(),
                    });

                    tracing::warn!(
                        notification_id = %record.notification_id,
                        attempts,
                        "Alert permanently failed after max attempts"
                    );

                    Ok(RetryOutcome::Terminal)
                } else {
                    let delay_secs = base_delay_secs * (1_i64 << attempts);
                    let next_attempt_at =
                        chrono::Utc::now() + chrono::Duration::seconds(delay_secs);

                    db::retries::reschedule(
                        &self.db,
                        record.notification_id,
                        attempts,
                        next_attempt_at,
                        &detail,
                    )
                    .await?;

                    self.event_bus.emit_lossy(ReplyqEvent::NotificationFailed {
                        notification_id: record.notification_id,
                        review_id: record.review_id,
                        attempt_count: attempts,
                        terminal: false,
                        timestamp: chrono::Utc::now(),
                    });

                    tracing::info!(
                        notification_id = %record.notification_id,
                        attempts,
                        delay_secs,
                        "Alert rescheduled with backoff"
                    );

                    Ok(RetryOutcome::Rescheduled)
                }
            }
        }
    }
}

enum RetryOutcome {
    Sent,
    Rescheduled,
    Terminal,
}

#[cfg(test)]
mod tests {
    #[test]
    fn backoff_doubles_per_attempt() {
        let base = 300_i64;
        let delays: Vec<i64> = (1..=3).map(|n| base * (1_i64 << n)).collect();
        assert_eq!(delays, vec![600, 1200, 2400]);

        // Monotonic: each delay exceeds the previous by base * 2^n
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0] + base);
        }
    }
}
