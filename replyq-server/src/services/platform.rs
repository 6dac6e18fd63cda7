//! Platform reply-posting adapter
//!
//! Posts an approved reply back to the originating review platform through
//! the aggregator API. The `CredentialsRevoked` variant is terminal for the
//! source until the owner re-authorizes out of band.

use crate::models::Platform;
use crate::services::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReplyQ/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_MS: u64 = 500;

/// Reply posting errors
#[derive(Debug, Error)]
pub enum PostError {
    #[error("Network error: {0}")]
    Network(String),

    /// Platform credentials are no longer valid
    #[error("Credentials revoked for review {0}")]
    CredentialsRevoked(String),

    #[error("Review no longer exists on platform: {0}")]
    ReviewGone(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result of a successful post
#[derive(Debug, Clone)]
pub struct PostedReply {
    /// Platform-side id of the published reply, when the API returns one
    pub platform_reply_id: Option<String>,
}

/// Reply posting seam
#[async_trait]
pub trait PlatformPoster: Send + Sync {
    async fn post_reply(
        &self,
        platform: Platform,
        external_review_id: &str,
        text: &str,
    ) -> Result<PostedReply, PostError>;
}

#[derive(Deserialize)]
struct PostResponse {
    reply_id: Option<String>,
}

/// HTTP client for posting replies through the aggregator API
pub struct HttpPlatformPoster {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: String,
}

impl HttpPlatformPoster {
    pub fn new(base_url: String, api_key: String) -> Result<Self, PostError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PostError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl PlatformPoster for HttpPlatformPoster {
    async fn post_reply(
        &self,
        platform: Platform,
        external_review_id: &str,
        text: &str,
    ) -> Result<PostedReply, PostError> {
        self.rate_limiter.wait().await;

        let url = format!(
            "{}/v1/{}/reviews/{}/reply",
            self.base_url,
            platform.as_str(),
            external_review_id
        );

        tracing::debug!(platform = platform.as_str(), review = %external_review_id, "Posting reply");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| PostError::Network(e.to_string()))?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(PostError::CredentialsRevoked(external_review_id.to_string()));
        }
        if status == 404 {
            return Err(PostError::ReviewGone(external_review_id.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PostError::Api(status.as_u16(), error_text));
        }

        let parsed: PostResponse = response
            .json()
            .await
            .map_err(|e| PostError::Parse(e.to_string()))?;

        Ok(PostedReply {
            platform_reply_id: parsed.reply_id,
        })
    }
}
