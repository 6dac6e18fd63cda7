//! Configuration loading and resolution
//!
//! Resolution priority for every value:
//! 1. Environment variable (`REPLYQ_*`)
//! 2. TOML config file
//! 3. Compiled default
//!
//! Operational tunables (poll intervals, retry delays, batch sizes) live in
//! the database `settings` table instead and are seeded by `db::init`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level TOML configuration for the service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TomlConfig {
    /// HTTP bind address, e.g. "127.0.0.1:8640"
    pub bind_address: Option<String>,
    /// Path to the SQLite database file
    pub database_path: Option<String>,
    /// Production flag; when set, a webhook secret is mandatory
    #[serde(default)]
    pub production: bool,
    /// Shared secret expected on inbound webhook requests
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub sms: SmsGatewayConfig,
    #[serde(default)]
    pub sources: ReviewSourceConfig,
    #[serde(default)]
    pub generator: ReplyGeneratorConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// SMS gateway credentials and routing
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsGatewayConfig {
    pub base_url: Option<String>,
    pub account_id: Option<String>,
    pub auth_token: Option<String>,
    /// Number outbound alerts are sent from
    pub from_number: Option<String>,
}

/// Review source aggregator API
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReviewSourceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Reply generation API
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplyGeneratorConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Billing portal API
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BillingConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("replyq").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./replyq.toml"))
}

/// Default database path for the platform
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("replyq").join("replyq.db"))
        .unwrap_or_else(|| PathBuf::from("./replyq.db"))
}

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist, then apply environment variable overrides.
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?
    } else {
        tracing::info!("No config file at {}, using defaults", path.display());
        TomlConfig::default()
    };

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

/// Apply `REPLYQ_*` environment variable overrides
fn apply_env_overrides(config: &mut TomlConfig) {
    if let Ok(v) = std::env::var("REPLYQ_BIND_ADDRESS") {
        config.bind_address = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_DATABASE_PATH") {
        config.database_path = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_PRODUCTION") {
        config.production = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = std::env::var("REPLYQ_WEBHOOK_SECRET") {
        config.webhook_secret = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SMS_BASE_URL") {
        config.sms.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SMS_ACCOUNT_ID") {
        config.sms.account_id = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SMS_AUTH_TOKEN") {
        config.sms.auth_token = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SMS_FROM_NUMBER") {
        config.sms.from_number = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SOURCES_BASE_URL") {
        config.sources.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_SOURCES_API_KEY") {
        config.sources.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_GENERATOR_BASE_URL") {
        config.generator.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_GENERATOR_API_KEY") {
        config.generator.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_BILLING_BASE_URL") {
        config.billing.base_url = Some(v);
    }
    if let Ok(v) = std::env::var("REPLYQ_BILLING_API_KEY") {
        config.billing.api_key = Some(v);
    }
}

/// Validate configuration invariants that must hold before startup
///
/// A production deployment without a webhook secret would accept forged
/// inbound SMS, so that combination refuses to start.
fn validate(config: &TomlConfig) -> Result<()> {
    if config.production && !is_valid_secret(config.webhook_secret.as_deref()) {
        return Err(Error::Config(
            "webhook_secret is required when production = true. Configure using one of:\n\
             1. TOML config: webhook_secret = \"your-secret\"\n\
             2. Environment: REPLYQ_WEBHOOK_SECRET=your-secret"
                .to_string(),
        ));
    }
    Ok(())
}

/// Validate secret value (non-empty, non-whitespace)
pub fn is_valid_secret(secret: Option<&str>) -> bool {
    secret.map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Resolve the database path from config or platform default
pub fn resolve_database_path(config: &TomlConfig) -> PathBuf {
    config
        .database_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_database_path)
}

/// Resolve the bind address from config or compiled default
pub fn resolve_bind_address(config: &TomlConfig) -> String {
    config
        .bind_address
        .clone()
        .unwrap_or_else(|| "127.0.0.1:8640".to_string())
}
