//! Database access for replyq-server
//!
//! Query functions are grouped per table and take the pool (or a
//! transaction connection for the operations that must be atomic with
//! their siblings).

pub mod businesses;
pub mod competitors;
pub mod conversations;
pub mod drafts;
pub mod notifications;
pub mod posted;
pub mod retries;
pub mod reviews;
pub mod settings;
pub mod sources;

use chrono::{DateTime, Utc};
use replyq_common::{Error, Result};

/// Parse an RFC3339 timestamp stored as TEXT
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}

/// Parse a UUID stored as TEXT
pub(crate) fn parse_uuid(s: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))
}
