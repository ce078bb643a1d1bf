//! ChangeTierHandler - Command handler for switching an active subscription's tier.

use std::sync::Arc;

use crate::domain::billing::{BillingError, UserSubscription};
use crate::domain::foundation::{Money, SubscriptionId, TierId, UserId};
use crate::ports::TierRepository;

use crate::application::router::{ProviderRouter, Repeat};
use crate::application::state_machine::SubscriptionStateMachine;

#[derive(Debug, Clone)]
pub struct ChangeTierCommand {
    pub subscription_id: SubscriptionId,
    pub new_tier_id: TierId,
    pub requested_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct ChangeTierResult {
    pub subscription: UserSubscription,
    /// Credit for the unused part of the period at the old price.
    pub credit: Money,
}

/// Handler for tier changes.
///
/// The unused share of the current period is credited, rounded per policy.
/// The provider is told first: it moves to the new price from the next
/// invoice on and receives the credit to apply against that invoice. The
/// local record only changes once the provider has accepted, and the
/// credit stays pending until a successful payment settles it.
pub struct ChangeTierHandler {
    machine: Arc<SubscriptionStateMachine>,
    tiers: Arc<dyn TierRepository>,
    router: Arc<ProviderRouter>,
}

impl ChangeTierHandler {
    pub fn new(
        machine: Arc<SubscriptionStateMachine>,
        tiers: Arc<dyn TierRepository>,
        router: Arc<ProviderRouter>,
    ) -> Self {
        Self { machine, tiers, router }
    }

    pub async fn handle(&self, cmd: ChangeTierCommand) -> Result<ChangeTierResult, BillingError> {
        let locked = self.machine.lock(cmd.subscription_id).await;
        let (sub, old_tier) = locked.load().await?;
        if let Some(user) = &cmd.requested_by {
            if &sub.user_id != user {
                return Err(BillingError::SubscriptionNotFound(cmd.subscription_id.to_string()));
            }
        }
        let new_tier = self
            .tiers
            .find_by_id(cmd.new_tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(cmd.new_tier_id))?;

        // Validate and price the change before the provider hears of it.
        let now = self.machine.now();
        let credit = sub
            .clone()
            .change_tier(&old_tier, &new_tier, &self.machine.policy(), now)?;

        self.router
            .execute_on(sub.provider_id, "update_subscription", Repeat::Transient, |gateway| {
                let external_ref = sub.external_ref.clone();
                let tier = new_tier.clone();
                let credit = credit.clone();
                async move { gateway.update_subscription(&external_ref, &tier, &credit).await }
            })
            .await?;

        let (subscription, credit) = locked
            .mutate(|s, ctx| s.change_tier(&old_tier, &new_tier, ctx.policy, now))
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            from_tier = %old_tier.id,
            to_tier = %new_tier.id,
            credit_minor = credit.amount_minor,
            "tier changed"
        );
        Ok(ChangeTierResult { subscription, credit })
    }
}
