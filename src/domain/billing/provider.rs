//! Payment provider configuration.
//!
//! A `ProviderConfiguration` is one immutable version of an operator's
//! settings for a provider. Edits never mutate a value in place; the
//! configuration store produces the next version and swaps it in.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Currency, ProviderId, Timestamp, ValidationError};

/// Longest per-call timeout an operator may configure.
pub const MAX_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Highest priority value accepted (lower is tried first).
pub const MAX_PROVIDER_PRIORITY: u32 = 10_000;

/// Which adapter implementation talks to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Card-network processor (form-encoded REST, timestamped HMAC header).
    CardNetwork,
    /// Alternative wallet processor (JSON REST, bearer auth).
    Wallet,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::CardNetwork, ProviderKind::Wallet];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::CardNetwork => "card-network",
            ProviderKind::Wallet => "wallet",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card-network" | "card_network" => Ok(ProviderKind::CardNetwork),
            "wallet" => Ok(ProviderKind::Wallet),
            other => Err(ValidationError::invalid_format(
                "provider_kind",
                format!("unknown provider kind '{}'", other),
            )),
        }
    }
}

/// Provider account environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEnvironment {
    Sandbox,
    Live,
}

/// Payment method families a provider can charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Wallet,
    BankTransfer,
}

/// Decrypted provider credentials.
///
/// Only ever materialized inside the gateway adapter boundary.
#[derive(Clone, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl ProviderCredentials {
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            account_id,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ValidationError::empty_field("api_key"));
        }
        if self.webhook_secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::empty_field("webhook_secret"));
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Opaque encrypted credential blob (base64 of nonce + ciphertext).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedCredentials(String);

impl EncryptedCredentials {
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_encoded(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedCredentials({} bytes)", self.0.len())
    }
}

/// One immutable version of a provider's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    pub id: ProviderId,
    /// Monotonic per-provider version, starting at 1.
    pub version: u64,
    pub kind: ProviderKind,
    pub display_name: String,
    pub environment: ProviderEnvironment,
    pub priority: u32,
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub supported_currencies: Vec<Currency>,
    pub supported_methods: Vec<PaymentMethod>,
    pub credentials: EncryptedCredentials,
    /// Override for the provider API root (sandbox hosts, test servers).
    pub api_base_url: Option<String>,
    pub updated_at: Timestamp,
    pub updated_by: String,
}

impl ProviderConfiguration {
    /// Per-call timeout for outbound requests to this provider.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn supports(&self, currency: &Currency, method: PaymentMethod) -> bool {
        self.supported_currencies.contains(currency) && self.supported_methods.contains(&method)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::empty_field("display_name"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > MAX_PROVIDER_TIMEOUT_SECS {
            return Err(ValidationError::out_of_range(
                "timeout_secs",
                1,
                MAX_PROVIDER_TIMEOUT_SECS as i64,
                self.timeout_secs as i64,
            ));
        }
        if self.priority > MAX_PROVIDER_PRIORITY {
            return Err(ValidationError::out_of_range(
                "priority",
                0,
                MAX_PROVIDER_PRIORITY as i64,
                self.priority as i64,
            ));
        }
        if self.max_retries > 10 {
            return Err(ValidationError::out_of_range(
                "max_retries",
                0,
                10,
                self.max_retries as i64,
            ));
        }
        if self.supported_currencies.is_empty() {
            return Err(ValidationError::empty_field("supported_currencies"));
        }
        if self.supported_methods.is_empty() {
            return Err(ValidationError::empty_field("supported_methods"));
        }
        if self.credentials.as_encoded().is_empty() {
            return Err(ValidationError::empty_field("credentials"));
        }
        if let Some(url) = &self.api_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::invalid_format(
                    "api_base_url",
                    "must be an http(s) URL",
                ));
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::provider;
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_str() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("paper-cheque".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn provider_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ProviderKind::CardNetwork).unwrap();
        assert_eq!(json, "\"card-network\"");
    }

    #[test]
    fn supports_requires_currency_and_method() {
        let p = provider(ProviderKind::CardNetwork, 1);
        let usd = Currency::new("USD").unwrap();
        let eur = Currency::new("EUR").unwrap();

        assert!(p.supports(&usd, PaymentMethod::Card));
        assert!(!p.supports(&eur, PaymentMethod::Card));
        assert!(!p.supports(&usd, PaymentMethod::Wallet));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut p = provider(ProviderKind::Wallet, 1);
        p.timeout_secs = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_currency_list() {
        let mut p = provider(ProviderKind::Wallet, 1);
        p.supported_currencies.clear();
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let mut p = provider(ProviderKind::Wallet, 1);
        p.api_base_url = Some("ftp://example".into());
        assert!(p.validate().is_err());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = ProviderCredentials::new("sk_live_abc", "whsec_abc", None);
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("sk_live_abc"));
        assert!(!printed.contains("whsec_abc"));
    }

    #[test]
    fn credentials_validate_rejects_blank_secret() {
        let creds = ProviderCredentials::new("sk", " ", None);
        assert!(creds.validate().is_err());
    }
}
