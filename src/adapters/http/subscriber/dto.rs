//! HTTP DTOs for subscriber endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    PaymentAttempt, PaymentMethod, ProviderKind, SubscriptionStatus, SubscriptionTier, UserSubscription,
};
use crate::domain::foundation::{Money, ProviderId, SubscriptionId, TierId, Timestamp, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub tier_id: TierId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
    /// Payment-method token collected client-side by the provider's widget.
    #[serde(default)]
    pub payment_token: Option<String>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Card
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeTierRequest {
    pub tier_id: TierId,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription as shown to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub tier_id: TierId,
    pub provider_id: ProviderId,
    pub provider_kind: ProviderKind,
    pub status: SubscriptionStatus,
    pub trial_end: Option<Timestamp>,
    pub current_period_end: Timestamp,
    pub grace_period_end: Option<Timestamp>,
    pub retry_count: u32,
    pub next_retry_at: Option<Timestamp>,
    pub pending_credit: Option<Money>,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<UserSubscription> for SubscriptionView {
    fn from(s: UserSubscription) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            tier_id: s.tier_id,
            provider_id: s.provider_id,
            provider_kind: s.provider_kind,
            status: s.status,
            trial_end: s.trial_end,
            current_period_end: s.current_period_end,
            grace_period_end: s.grace_period_end,
            retry_count: s.retry_count,
            next_retry_at: s.next_retry_at,
            pending_credit: s.pending_credit,
            canceled_at: s.canceled_at,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDetailResponse {
    pub subscription: SubscriptionView,
    pub tier: SubscriptionTier,
    pub payments: Vec<PaymentAttempt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeTierResponse {
    pub subscription: SubscriptionView,
    /// Credit for the unused part of the old tier's period.
    pub credit: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactivateResponse {
    pub subscription: SubscriptionView,
    pub payment: PaymentAttempt,
}
