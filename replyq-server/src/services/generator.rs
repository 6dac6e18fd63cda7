//! Reply generation adapter
//!
//! Produces the draft reply text (and its own escalation view) for a newly
//! ingested review. The coordinator unions the generator's escalation
//! signals with the keyword classifier's.

use crate::models::{Business, ReplyOutput, Review};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReplyQ/", env!("CARGO_PKG_VERSION"));

/// Reply generator errors
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Draft generation seam
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(
        &self,
        review: &Review,
        business: &Business,
    ) -> Result<ReplyOutput, GeneratorError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    business_name: &'a str,
    platform: &'a str,
    rating: i64,
    review_text: &'a str,
    sentiment: &'a str,
}

/// HTTP client for the reply generation API
pub struct HttpReplyGenerator {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpReplyGenerator {
    pub fn new(base_url: String, api_key: String) -> Result<Self, GeneratorError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn generate_reply(
        &self,
        review: &Review,
        business: &Business,
    ) -> Result<ReplyOutput, GeneratorError> {
        let url = format!("{}/v1/replies/generate", self.base_url);

        let request = GenerateRequest {
            business_name: &business.name,
            platform: review.platform.as_str(),
            rating: review.rating,
            review_text: &review.text,
            sentiment: review.sentiment.as_str(),
        };

        tracing::debug!(review_id = %review.guid, "Requesting draft reply");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api(status.as_u16(), error_text));
        }

        let output: ReplyOutput = response
            .json()
            .await
            .map_err(|e| GeneratorError::Parse(e.to_string()))?;

        tracing::info!(
            review_id = %review.guid,
            escalation = output.escalation,
            confidence = output.confidence,
            "Draft reply generated"
        );

        Ok(output)
    }
}
