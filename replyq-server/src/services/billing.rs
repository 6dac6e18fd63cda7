//! Billing portal adapter
//!
//! Only the two operations the SMS flows need: a portal link for BILLING
//! and subscription cancellation for the confirmed CANCEL flow.

use crate::models::Business;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReplyQ/", env!("CARGO_PKG_VERSION"));

/// Billing portal errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Billing API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Billing operations seam
#[async_trait]
pub trait BillingPortal: Send + Sync {
    /// Short-lived self-service portal link for the owner
    async fn portal_url(&self, business: &Business) -> Result<String, BillingError>;

    /// Cancel the subscription; local cancel state is only persisted when
    /// this succeeds
    async fn cancel_subscription(&self, business: &Business) -> Result<(), BillingError>;
}

#[derive(Deserialize)]
struct PortalResponse {
    url: String,
}

/// HTTP client for the billing API
pub struct HttpBillingPortal {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBillingPortal {
    pub fn new(base_url: String, api_key: String) -> Result<Self, BillingError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BillingError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl BillingPortal for HttpBillingPortal {
    async fn portal_url(&self, business: &Business) -> Result<String, BillingError> {
        let url = format!("{}/v1/portal-sessions", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "business_id": business.guid }))
            .send()
            .await
            .map_err(|e| BillingError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BillingError::Api(status.as_u16(), error_text));
        }

        let parsed: PortalResponse = response
            .json()
            .await
            .map_err(|e| BillingError::Parse(e.to_string()))?;

        Ok(parsed.url)
    }

    async fn cancel_subscription(&self, business: &Business) -> Result<(), BillingError> {
        let url = format!("{}/v1/subscriptions/{}/cancel", self.base_url, business.guid);

        tracing::info!(business_id = %business.guid, "Requesting subscription cancellation");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BillingError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BillingError::Api(status.as_u16(), error_text));
        }

        Ok(())
    }
}
