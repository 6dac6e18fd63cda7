//! SMS gateway adapter
//!
//! Form-encoded send API in the shape most SMS gateways expose. The trait is
//! the seam the dispatcher and retry scheduler send through.

use crate::services::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ReplyQ/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_MS: u64 = 200;

/// SMS gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway rejected message ({0}): {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Outbound SMS seam
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send a message; returns the gateway's message id for status tracking
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, GatewayError>;
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: String,
}

/// HTTP client for the SMS gateway
pub struct HttpSmsGateway {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    account_id: String,
    auth_token: String,
    from_number: String,
}

impl HttpSmsGateway {
    pub fn new(
        base_url: String,
        account_id: String,
        auth_token: String,
        from_number: String,
    ) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            base_url,
            account_id,
            auth_token,
            from_number,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send_sms(&self, to: &str, body: &str) -> Result<String, GatewayError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/accounts/{}/messages", self.base_url, self.account_id);

        let params = [("To", to), ("From", self.from_number.as_str()), ("Body", body)];

        tracing::debug!(to = %to, chars = body.len(), "Sending SMS");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status.as_u16(), error_text));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        tracing::info!(to = %to, message_id = %parsed.message_id, "SMS accepted by gateway");

        Ok(parsed.message_id)
    }
}
