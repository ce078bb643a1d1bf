//! Engine-initiated charges.
//!
//! Every charge the engine starts itself (trial conversion, scheduled
//! retry, manual reactivation) goes to the provider that owns the
//! subscription, exactly once, and leaves a `PaymentAttempt` behind.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, ChargeReason, PaymentAttempt, PaymentOutcome, SubscriptionTier, UserSubscription,
};
use crate::domain::foundation::{Clock, Money};
use crate::ports::PaymentAttemptRepository;

use super::router::{ProviderRouter, Repeat};

/// A recorded attempt and, when it failed, why.
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub attempt: PaymentAttempt,
    pub error: Option<BillingError>,
}

impl ChargeOutcome {
    pub fn succeeded(&self) -> bool {
        self.attempt.succeeded()
    }

    /// The provider did not give a definitive answer: it erred transiently,
    /// timed out or was unavailable. Declines are final.
    pub fn failed_transiently(&self) -> bool {
        matches!(
            self.error,
            Some(BillingError::ProviderTransient { .. } | BillingError::ProviderUnavailable { .. })
        )
    }

    pub fn into_result(self) -> Result<PaymentAttempt, BillingError> {
        match self.error {
            None => Ok(self.attempt),
            Some(e) => Err(e),
        }
    }
}

pub struct Charger {
    router: Arc<ProviderRouter>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    clock: Arc<dyn Clock>,
}

impl Charger {
    pub fn new(
        router: Arc<ProviderRouter>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            router,
            attempts,
            clock,
        }
    }

    /// Charges what `sub` owes on `tier`, net of pending credit.
    ///
    /// Provider failures come back inside the outcome, never as `Err`. An
    /// amount fully covered by credit succeeds without a provider call.
    pub async fn charge(
        &self,
        sub: &UserSubscription,
        tier: &SubscriptionTier,
        reason: ChargeReason,
        attempt_number: u32,
    ) -> ChargeOutcome {
        let amount = sub.amount_due(tier);
        if amount.is_zero() {
            let attempt = self
                .record(sub, reason, attempt_number, amount, PaymentOutcome::Succeeded, None, None)
                .await;
            return ChargeOutcome { attempt, error: None };
        }

        let result = self
            .router
            .execute_on(sub.provider_id, "charge", Repeat::Never, |gateway| {
                let external_ref = sub.external_ref.clone();
                let amount = amount.clone();
                async move { gateway.charge(&external_ref, &amount).await }
            })
            .await;

        match result {
            Ok(routed) => {
                tracing::info!(
                    subscription_id = %sub.id,
                    provider_id = %sub.provider_id,
                    reason = ?reason,
                    payment_ref = %routed.value.payment_ref,
                    "charge succeeded"
                );
                let attempt = self
                    .record(
                        sub,
                        reason,
                        attempt_number,
                        amount,
                        PaymentOutcome::Succeeded,
                        Some(routed.value.payment_ref),
                        None,
                    )
                    .await;
                ChargeOutcome { attempt, error: None }
            }
            Err(e) => {
                let (outcome, code) = match &e {
                    BillingError::ProviderPermanent { code, .. } => (PaymentOutcome::Declined, code.clone()),
                    _ => (PaymentOutcome::Error, None),
                };
                tracing::warn!(
                    subscription_id = %sub.id,
                    provider_id = %sub.provider_id,
                    reason = ?reason,
                    outcome = outcome.as_str(),
                    error = %e,
                    "charge failed"
                );
                let attempt = self
                    .record(sub, reason, attempt_number, amount, outcome, None, code)
                    .await;
                ChargeOutcome { attempt, error: Some(e) }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        sub: &UserSubscription,
        reason: ChargeReason,
        attempt_number: u32,
        amount: Money,
        outcome: PaymentOutcome,
        payment_ref: Option<String>,
        provider_code: Option<String>,
    ) -> PaymentAttempt {
        let attempt = PaymentAttempt::record(
            sub.id,
            sub.provider_id,
            attempt_number,
            reason,
            amount,
            outcome,
            payment_ref,
            provider_code,
            self.clock.now(),
        );
        // The money already moved (or didn't); the state change must follow either way.
        if let Err(e) = self.attempts.append(&attempt).await {
            tracing::error!(subscription_id = %sub.id, attempt_id = %attempt.id, error = %e, "payment attempt not recorded");
        }
        attempt
    }
}
