//! Review source adapter
//!
//! The `ReviewSource` trait is the seam the ingestion coordinator fetches
//! through; the HTTP implementation talks to the review aggregator API.

use crate::models::{RawReview, ReviewSourceRecord};
use crate::services::rate_limit::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReplyQ/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_MS: u64 = 500;

/// Review source errors
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    /// Platform credentials are no longer valid; re-authorization is an
    /// out-of-band operation, not a retry
    #[error("Credentials revoked for source {0}")]
    CredentialsRevoked(String),

    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Per-platform review fetching seam
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch reviews for a source listing, newest window first
    ///
    /// `since` is the caller's watermark; sources typically return a sliding
    /// window rather than strictly-new items, so callers must dedup.
    async fn fetch_reviews(
        &self,
        source: &ReviewSourceRecord,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawReview>, SourceError>;
}

/// HTTP client for the review aggregator API
pub struct HttpReviewSource {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: String,
}

impl HttpReviewSource {
    pub fn new(base_url: String, api_key: String) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    async fn fetch_reviews(
        &self,
        source: &ReviewSourceRecord,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawReview>, SourceError> {
        self.rate_limiter.wait().await;

        let mut url = format!(
            "{}/v1/{}/locations/{}/reviews",
            self.base_url,
            source.platform.as_str(),
            source.external_source_id
        );
        if let Some(since) = since {
            url.push_str(&format!("?since={}", since.to_rfc3339()));
        }

        tracing::debug!(source_id = %source.guid, url = %url, "Fetching reviews");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(SourceError::CredentialsRevoked(
                source.external_source_id.clone(),
            ));
        }
        if status == 404 {
            return Err(SourceError::NotFound(source.external_source_id.clone()));
        }
        if status == 429 {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SourceError::Api(status.as_u16(), error_text));
        }

        let reviews: Vec<RawReview> = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        tracing::info!(
            source_id = %source.guid,
            platform = source.platform.as_str(),
            count = reviews.len(),
            "Fetched review window"
        );

        Ok(reviews)
    }
}
