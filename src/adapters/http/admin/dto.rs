//! HTTP DTOs for the operator API.

use serde::{Deserialize, Serialize};

use crate::application::{ProviderDraft, ProviderHealth, ProviderSummary};
use crate::domain::billing::{
    BillingPeriod, GlobalBillingPolicy, PaymentMethod, ProviderCredentials, ProviderEnvironment, ProviderKind,
    RoundingRule,
};
use crate::domain::foundation::{Currency, Money, ProviderId, TierId};

// ════════════════════════════════════════════════════════════════════════════════
// Providers
// ════════════════════════════════════════════════════════════════════════════════

/// Plaintext credentials as submitted. Encrypted before storage.
#[derive(Clone, Deserialize)]
pub struct CredentialsRequest {
    pub api_key: String,
    pub webhook_secret: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl std::fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Create or replace a provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRequest {
    pub kind: ProviderKind,
    pub display_name: String,
    pub environment: ProviderEnvironment,
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub supported_currencies: Vec<Currency>,
    pub supported_methods: Vec<PaymentMethod>,
    /// Required on create; omitted on edit keeps the stored credentials.
    #[serde(default)]
    pub credentials: Option<CredentialsRequest>,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

impl ProviderRequest {
    pub fn into_draft(self, id: Option<ProviderId>) -> ProviderDraft {
        ProviderDraft {
            id,
            kind: self.kind,
            display_name: self.display_name,
            environment: self.environment,
            priority: self.priority,
            enabled: self.enabled,
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            supported_currencies: self.supported_currencies,
            supported_methods: self.supported_methods,
            credentials: self
                .credentials
                .map(|c| ProviderCredentials::new(c.api_key, c.webhook_secret, c.account_id)),
            api_base_url: self.api_base_url,
        }
    }
}

/// A provider together with its routing health.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatusView {
    #[serde(flatten)]
    pub provider: ProviderSummary,
    pub health: ProviderHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderListResponse {
    pub config_version: u64,
    pub providers: Vec<ProviderStatusView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderRemovalResponse {
    /// `removed`, or `deactivated` when subscriptions still reference it.
    pub result: &'static str,
    pub provider: Option<ProviderSummary>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Policy
// ════════════════════════════════════════════════════════════════════════════════

/// Replacement policy. The version is assigned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRequest {
    pub default_currency: Currency,
    pub grace_period_days: u32,
    pub trial_enabled: bool,
    pub default_trial_days: u32,
    pub max_payment_retries: u32,
    pub retry_interval_days: u32,
    #[serde(default = "default_enabled")]
    pub auto_bill_outstanding: bool,
    #[serde(default = "default_enabled")]
    pub proration_enabled: bool,
    #[serde(default = "default_rounding")]
    pub proration_rounding: RoundingRule,
}

fn default_rounding() -> RoundingRule {
    RoundingRule::HalfUp
}

impl From<PolicyRequest> for GlobalBillingPolicy {
    fn from(r: PolicyRequest) -> Self {
        GlobalBillingPolicy {
            version: 0,
            default_currency: r.default_currency,
            grace_period_days: r.grace_period_days,
            trial_enabled: r.trial_enabled,
            default_trial_days: r.default_trial_days,
            max_payment_retries: r.max_payment_retries,
            retry_interval_days: r.retry_interval_days,
            auto_bill_outstanding: r.auto_bill_outstanding,
            proration_enabled: r.proration_enabled,
            proration_rounding: r.proration_rounding,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Tiers, refunds, audit
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTierRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    pub period: BillingPeriod,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Partial tier edit. A new price on a tier with live subscribers creates
/// a successor tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTierRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_default: Option<bool>,
    pub price: Option<Money>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateTierResponse {
    pub tier: crate::domain::billing::SubscriptionTier,
    pub retired: Option<TierId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTiersParams {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    /// Partial refund; the whole charge when absent.
    #[serde(default)]
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditParams {
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_request_fills_defaults() {
        let request: ProviderRequest = serde_json::from_value(serde_json::json!({
            "kind": "card-network",
            "display_name": "Cards",
            "environment": "sandbox",
            "priority": 1,
            "supported_currencies": ["usd"],
            "supported_methods": ["card"],
            "credentials": {"api_key": "sk_test_1", "webhook_secret": "whsec_1"}
        }))
        .unwrap();

        let draft = request.into_draft(None);
        assert!(draft.enabled);
        assert_eq!(draft.timeout_secs, 10);
        assert_eq!(draft.supported_currencies, vec![Currency::usd()]);
        assert!(draft.credentials.is_some());
    }

    #[test]
    fn credentials_are_not_debug_printed() {
        let creds = CredentialsRequest {
            api_key: "sk_live_secret".into(),
            webhook_secret: "whsec_secret".into(),
            account_id: None,
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("sk_live_secret"));
        assert!(!printed.contains("whsec_secret"));
    }

    #[test]
    fn policy_request_leaves_version_to_the_server() {
        let request: PolicyRequest = serde_json::from_value(serde_json::json!({
            "default_currency": "EUR",
            "grace_period_days": 7,
            "trial_enabled": false,
            "default_trial_days": 0,
            "max_payment_retries": 3,
            "retry_interval_days": 2
        }))
        .unwrap();
        let policy = GlobalBillingPolicy::from(request);
        assert_eq!(policy.version, 0);
        assert_eq!(policy.proration_rounding, RoundingRule::HalfUp);
    }
}
