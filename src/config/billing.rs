//! Billing engine configuration

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::application::SchedulerConfig;

use super::error::ValidationError;
use super::server::Environment;

/// Billing engine configuration
///
/// Intervals are in seconds. `config_refresh_secs` bounds how stale the
/// in-process configuration snapshot can get relative to storage when
/// several instances share one database.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Base64 encoding of the 32-byte credential encryption key
    pub encryption_key: SecretString,

    #[serde(default = "default_scheduler_tick")]
    pub scheduler_tick_secs: u64,

    #[serde(default = "default_health_probe_interval")]
    pub health_probe_interval_secs: u64,

    #[serde(default = "default_config_refresh")]
    pub config_refresh_secs: u64,

    /// Consecutive transient failures before a provider is deprioritized
    #[serde(default = "default_unhealthy_after_failures")]
    pub unhealthy_after_failures: u32,

    /// Processing attempts before a webhook record becomes terminal
    #[serde(default = "default_max_webhook_attempts")]
    pub max_webhook_attempts: u32,

    /// Optimistic save attempts on version conflicts
    #[serde(default = "default_lock_retry_attempts")]
    pub lock_retry_attempts: u32,

    #[serde(default = "default_webhook_retention_days")]
    pub webhook_retention_days: u32,

    /// Maximum age of a webhook signature timestamp
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    /// Retryable webhook records re-applied per scheduler tick
    #[serde(default = "default_webhook_batch_size")]
    pub webhook_batch_size: usize,

    /// Default API root for card-network providers
    #[serde(default = "default_card_network_api_url")]
    pub card_network_api_url: String,

    /// Default API root for wallet providers
    #[serde(default = "default_wallet_api_url")]
    pub wallet_api_url: String,
}

impl BillingConfig {
    /// Decoded encryption key.
    pub fn encryption_key_bytes(&self) -> Result<[u8; 32], ValidationError> {
        let bytes = BASE64
            .decode(self.encryption_key.expose_secret().trim())
            .map_err(|_| ValidationError::InvalidEncryptionKey)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| ValidationError::InvalidEncryptionKey)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(self.scheduler_tick_secs),
            probe_interval: Duration::from_secs(self.health_probe_interval_secs),
            config_refresh_interval: Duration::from_secs(self.config_refresh_secs),
            webhook_batch_size: self.webhook_batch_size,
            webhook_retention_days: self.webhook_retention_days,
        }
    }

    /// Validate billing configuration
    ///
    /// In production, provider API roots must use HTTPS.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.encryption_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("BILLING__ENCRYPTION_KEY"));
        }
        self.encryption_key_bytes()?;

        for (name, value) in [
            ("scheduler_tick_secs", self.scheduler_tick_secs),
            ("health_probe_interval_secs", self.health_probe_interval_secs),
            ("config_refresh_secs", self.config_refresh_secs),
        ] {
            if value == 0 {
                return Err(ValidationError::ZeroInterval(name));
            }
        }
        if self.unhealthy_after_failures == 0 {
            return Err(ValidationError::OutOfRange("unhealthy_after_failures"));
        }
        if self.max_webhook_attempts == 0 || self.max_webhook_attempts > 100 {
            return Err(ValidationError::OutOfRange("max_webhook_attempts"));
        }
        if self.lock_retry_attempts == 0 || self.lock_retry_attempts > 20 {
            return Err(ValidationError::OutOfRange("lock_retry_attempts"));
        }
        if self.webhook_retention_days == 0 {
            return Err(ValidationError::OutOfRange("webhook_retention_days"));
        }
        if self.webhook_tolerance_secs <= 0 || self.webhook_tolerance_secs > 3600 {
            return Err(ValidationError::OutOfRange("webhook_tolerance_secs"));
        }
        if self.webhook_batch_size == 0 {
            return Err(ValidationError::OutOfRange("webhook_batch_size"));
        }

        if *environment == Environment::Production {
            if !self.card_network_api_url.starts_with("https://") {
                return Err(ValidationError::GatewayUrlMustBeHttps("card_network_api_url"));
            }
            if !self.wallet_api_url.starts_with("https://") {
                return Err(ValidationError::GatewayUrlMustBeHttps("wallet_api_url"));
            }
        }
        Ok(())
    }
}

fn default_scheduler_tick() -> u64 {
    60
}

fn default_health_probe_interval() -> u64 {
    300
}

fn default_config_refresh() -> u64 {
    30
}

fn default_unhealthy_after_failures() -> u32 {
    3
}

fn default_max_webhook_attempts() -> u32 {
    5
}

fn default_lock_retry_attempts() -> u32 {
    3
}

fn default_webhook_retention_days() -> u32 {
    90
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_webhook_batch_size() -> usize {
    100
}

fn default_card_network_api_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_wallet_api_url() -> String {
    "https://api-m.paypal.com".to_string()
}
