//! Event types for the ReplyQ event system
//!
//! Provides shared event definitions and EventBus for broadcasting workflow
//! milestones to SSE subscribers and tests.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// ReplyQ event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. All workflow milestones use this central enum for type
/// safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReplyqEvent {
    /// A new review was stored together with its draft
    ReviewIngested {
        review_id: Uuid,
        business_id: Uuid,
        platform: String,
        sentiment: String,
        escalation: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Owner alert SMS was handed to the gateway
    NotificationSent {
        notification_id: Uuid,
        review_id: Uuid,
        phone: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Owner alert SMS failed; the retry scheduler owns it now
    NotificationFailed {
        notification_id: Uuid,
        review_id: Uuid,
        attempt_count: i64,
        terminal: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Draft approved by the owner (APPROVE or custom reply)
    DraftApproved {
        draft_id: Uuid,
        review_id: Uuid,
        custom_text: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Draft rejected by the owner (IGNORE)
    DraftRejected {
        draft_id: Uuid,
        review_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Approved draft was posted back to the originating platform
    ResponsePosted {
        draft_id: Uuid,
        review_id: Uuid,
        platform: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Posting attempt failed; draft stays approved for the next sweep
    ResponsePostFailed {
        draft_id: Uuid,
        review_id: Uuid,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Subscription cancelled through the SMS CANCEL flow
    SubscriptionCancelled {
        business_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for ReplyqEvents
///
/// Thin wrapper around `tokio::sync::broadcast` shared by the services and
/// the SSE endpoint.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReplyqEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ReplyqEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: ReplyqEvent) -> Result<usize, broadcast::error::SendError<ReplyqEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case
    ///
    /// Workflow progress events are advisory; nothing listening is normal
    /// when no SSE client is connected.
    pub fn emit_lossy(&self, event: ReplyqEvent) {
        let _ = self.tx.send(event);
    }

    /// Channel capacity this bus was created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit_lossy(ReplyqEvent::SubscriptionCancelled {
            business_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ReplyqEvent::SubscriptionCancelled { .. }));
    }

    #[test]
    fn emit_without_subscribers_is_lossy() {
        let bus = EventBus::new(4);
        // Must not panic or error
        bus.emit_lossy(ReplyqEvent::SubscriptionCancelled {
            business_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(bus.capacity(), 4);
    }
}
