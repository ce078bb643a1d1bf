//! Append-only record of charge attempts.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, PaymentAttemptId, ProviderId, SubscriptionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    /// Provider answered with a definitive refusal.
    Declined,
    /// Transport or provider-side failure.
    Error,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Declined => "declined",
            PaymentOutcome::Error => "error",
        }
    }
}

/// Why the engine initiated the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeReason {
    ScheduledRetry,
    TrialConversion,
    Reactivation,
}

/// One charge attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: PaymentAttemptId,
    pub subscription_id: SubscriptionId,
    pub provider_id: ProviderId,
    pub attempt_number: u32,
    pub reason: ChargeReason,
    pub amount: Money,
    pub outcome: PaymentOutcome,
    /// Provider charge reference on success (needed for refunds).
    pub payment_ref: Option<String>,
    pub provider_code: Option<String>,
    pub attempted_at: Timestamp,
}

impl PaymentAttempt {
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        subscription_id: SubscriptionId,
        provider_id: ProviderId,
        attempt_number: u32,
        reason: ChargeReason,
        amount: Money,
        outcome: PaymentOutcome,
        payment_ref: Option<String>,
        provider_code: Option<String>,
        attempted_at: Timestamp,
    ) -> Self {
        Self {
            id: PaymentAttemptId::new(),
            subscription_id,
            provider_id,
            attempt_number,
            reason,
            amount,
            outcome,
            payment_ref,
            provider_code,
            attempted_at,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == PaymentOutcome::Succeeded
    }
}
