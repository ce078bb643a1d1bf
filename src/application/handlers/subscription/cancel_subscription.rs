//! CancelSubscriptionHandler - Command handler for cancelling subscriptions.

use std::sync::Arc;

use crate::domain::billing::{BillingError, LifecycleTrigger, UserSubscription};
use crate::domain::foundation::{SubscriptionId, UserId};

use crate::application::router::{ProviderRouter, Repeat};
use crate::application::state_machine::SubscriptionStateMachine;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    /// When set, the subscription must belong to this user.
    pub requested_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: UserSubscription,
}

/// Handler for cancelling subscriptions.
///
/// The provider is told first; the local record only changes once the
/// provider has stopped billing. A failed provider call leaves the
/// subscription as it was so the caller can retry.
pub struct CancelSubscriptionHandler {
    machine: Arc<SubscriptionStateMachine>,
    router: Arc<ProviderRouter>,
}

impl CancelSubscriptionHandler {
    pub fn new(machine: Arc<SubscriptionStateMachine>, router: Arc<ProviderRouter>) -> Self {
        Self { machine, router }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let locked = self.machine.lock(cmd.subscription_id).await;
        let (sub, _) = locked.load().await?;

        if let Some(user) = &cmd.requested_by {
            if &sub.user_id != user {
                return Err(BillingError::SubscriptionNotFound(cmd.subscription_id.to_string()));
            }
        }
        if sub.status.next_status(LifecycleTrigger::CancelRequested).is_none() {
            return Err(BillingError::InvalidTransition {
                from: sub.status,
                trigger: LifecycleTrigger::CancelRequested,
            });
        }

        self.router
            .execute_on(sub.provider_id, "cancel_subscription", Repeat::Transient, |gateway| {
                let external_ref = sub.external_ref.clone();
                async move { gateway.cancel_subscription(&external_ref).await }
            })
            .await?;

        let (subscription, _) = locked
            .mutate(|s, ctx| s.apply(LifecycleTrigger::CancelRequested, ctx))
            .await?;
        tracing::info!(subscription_id = %subscription.id, "subscription canceled");
        Ok(CancelSubscriptionResult { subscription })
    }
}
