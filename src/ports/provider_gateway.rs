//! Provider gateway port.
//!
//! One capability interface over every payment provider. Concrete adapters
//! translate these generic operations into provider-specific calls; callers
//! never branch on provider kind.
//!
//! # Error classification
//!
//! - **Transient**: timeouts, connection failures, 5xx, 429; eligible for
//!   router failover and scheduled retry
//! - **Permanent**: other 4xx (bad request, declined, invalid credentials);
//!   surfaced immediately, no failover
//! - **Config**: the adapter could not be built from its configuration

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingError, NormalizedEvent, PaymentMethod, ProviderConfiguration, ProviderKind,
    SubscriptionTier,
};
use crate::domain::foundation::{Money, ProviderId, Timestamp, UserId};

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Creates the provider-side subscription.
    async fn create_subscription(
        &self,
        tier: &SubscriptionTier,
        customer: &CustomerRef,
        trial_end: Option<Timestamp>,
    ) -> Result<ExternalRef, GatewayError>;

    async fn cancel_subscription(&self, external_ref: &str) -> Result<(), GatewayError>;

    /// Moves the provider-side subscription to `tier` from the next invoice
    /// on and applies `credit` against that invoice. A zero credit only
    /// switches the price.
    async fn update_subscription(
        &self,
        external_ref: &str,
        tier: &SubscriptionTier,
        credit: &Money,
    ) -> Result<(), GatewayError>;

    /// Collects `amount` against the subscription's stored payment method.
    ///
    /// This settles the open invoice, so a successful charge also consumes
    /// any credit previously handed over by `update_subscription`.
    async fn charge(&self, external_ref: &str, amount: &Money) -> Result<ChargeReceipt, GatewayError>;

    async fn refund(&self, payment_ref: &str, amount: &Money) -> Result<RefundReceipt, GatewayError>;

    /// Checks the webhook signature with this provider's signing secret.
    ///
    /// The secret is bound when the gateway is built, so decrypted material
    /// never leaves the adapter.
    fn verify_webhook_signature(&self, raw_body: &[u8], headers: &WebhookHeaders) -> bool;

    /// Translates the provider payload into a normalized event.
    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, GatewayError>;

    /// Lightweight authenticated round-trip used by health probes.
    async fn test_connectivity(&self) -> ConnectivityReport;
}

/// Builds gateways from configuration versions.
///
/// Selection is by the configuration's `kind` value only.
pub trait GatewayRegistry: Send + Sync {
    fn gateway_for(
        &self,
        config: &ProviderConfiguration,
    ) -> Result<Arc<dyn ProviderGateway>, BillingError>;
}

/// Who is being subscribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRef {
    pub user_id: UserId,
    pub email: Option<String>,
    /// Provider-side customer id if one already exists.
    pub external_customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Opaque payment-method token collected client-side.
    pub payment_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub subscription_ref: String,
    pub customer_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub payment_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub success: bool,
    pub latency_ms: u64,
    pub diagnostic: String,
}

impl ConnectivityReport {
    pub fn ok(latency_ms: u64) -> Self {
        Self {
            success: true,
            latency_ms,
            diagnostic: "ok".to_string(),
        }
    }

    pub fn failed(latency_ms: u64, diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Webhook request headers with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders(HashMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    Transient,
    Permanent,
    Config,
}

/// Error returned by a gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// Provider-specific error code (e.g. "card_declined").
    pub provider_code: Option<String>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider_code: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Permanent, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Config, message)
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::transient(format!("timed out after {}s", after_secs))
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    /// Classifies an HTTP status from a provider API.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            408 | 429 => GatewayErrorKind::Transient,
            500..=599 => GatewayErrorKind::Transient,
            _ => GatewayErrorKind::Permanent,
        };
        Self::new(kind, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == GatewayErrorKind::Transient
    }

    /// Attaches the provider identity and lifts into the billing taxonomy.
    pub fn into_billing(self, provider: ProviderId) -> BillingError {
        match self.kind {
            GatewayErrorKind::Transient => BillingError::ProviderTransient {
                provider,
                message: self.message,
            },
            GatewayErrorKind::Permanent => BillingError::ProviderPermanent {
                provider,
                code: self.provider_code,
                message: self.message,
            },
            GatewayErrorKind::Config => BillingError::config_invalid(Some(provider), self.message),
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.provider_code {
            Some(code) => write!(f, "{:?} [{}]: {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_gateway_is_object_safe() {
        fn _accepts_dyn(_gateway: &dyn ProviderGateway) {}
        fn _accepts_registry(_registry: &dyn GatewayRegistry) {}
    }

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(GatewayError::from_status(500, "boom").is_transient());
        assert!(GatewayError::from_status(503, "down").is_transient());
        assert!(GatewayError::from_status(429, "slow down").is_transient());
        assert!(GatewayError::from_status(408, "timeout").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [400, 401, 402, 403, 404, 409, 422] {
            assert_eq!(
                GatewayError::from_status(status, "no").kind,
                GatewayErrorKind::Permanent,
                "status {}",
                status
            );
        }
    }

    #[test]
    fn into_billing_keeps_classification() {
        let provider = ProviderId::new();
        assert!(GatewayError::timeout(5).into_billing(provider).allows_failover());

        let declined = GatewayError::permanent("declined")
            .with_provider_code("card_declined")
            .into_billing(provider);
        assert!(matches!(
            declined,
            BillingError::ProviderPermanent { code: Some(ref c), .. } if c == "card_declined"
        ));

        assert!(matches!(
            GatewayError::config("bad key").into_billing(provider),
            BillingError::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn webhook_headers_lookup_is_case_insensitive() {
        let headers = WebhookHeaders::new().with("Card-Signature", "t=1,v1=ab");
        assert_eq!(headers.get("card-signature"), Some("t=1,v1=ab"));
        assert_eq!(headers.get("CARD-SIGNATURE"), Some("t=1,v1=ab"));
        assert!(headers.get("other").is_none());
    }

    #[test]
    fn display_includes_provider_code() {
        let err = GatewayError::permanent("declined").with_provider_code("insufficient_funds");
        assert!(err.to_string().contains("insufficient_funds"));
    }
}
