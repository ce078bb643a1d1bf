//! ReactivateSubscriptionHandler - Manual reactivation of a suspended subscription.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, ChargeReason, LifecycleTrigger, PaymentAttempt, SubscriptionStatus, UserSubscription,
};
use crate::domain::foundation::{SubscriptionId, UserId};

use crate::application::charging::Charger;
use crate::application::state_machine::SubscriptionStateMachine;

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub requested_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionResult {
    pub subscription: UserSubscription,
    pub payment: PaymentAttempt,
}

/// Handler for reactivating suspended subscriptions.
///
/// Reactivation is backed by a charge of the amount due; the subscription
/// only moves back to `Active` once that charge succeeds.
pub struct ReactivateSubscriptionHandler {
    machine: Arc<SubscriptionStateMachine>,
    charger: Arc<Charger>,
}

impl ReactivateSubscriptionHandler {
    pub fn new(machine: Arc<SubscriptionStateMachine>, charger: Arc<Charger>) -> Self {
        Self { machine, charger }
    }

    pub async fn handle(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionResult, BillingError> {
        let locked = self.machine.lock(cmd.subscription_id).await;
        let (sub, tier) = locked.load().await?;
        if let Some(user) = &cmd.requested_by {
            if &sub.user_id != user {
                return Err(BillingError::SubscriptionNotFound(cmd.subscription_id.to_string()));
            }
        }
        if sub.status != SubscriptionStatus::Suspended {
            return Err(BillingError::InvalidTransition {
                from: sub.status,
                trigger: LifecycleTrigger::Reactivated,
            });
        }

        let payment = self
            .charger
            .charge(&sub, &tier, ChargeReason::Reactivation, 1)
            .await
            .into_result()?;

        let (subscription, _) = locked
            .mutate(|s, ctx| s.apply(LifecycleTrigger::Reactivated, ctx))
            .await?;
        tracing::info!(subscription_id = %subscription.id, payment_id = %payment.id, "subscription reactivated");
        Ok(ReactivateSubscriptionResult { subscription, payment })
    }
}
