//! CreateSubscriptionHandler - Command handler for new subscriptions.

use std::sync::Arc;

use crate::domain::billing::{BillingError, NewSubscription, PaymentMethod, UserSubscription};
use crate::domain::foundation::{ProviderId, TierId, UserId};
use crate::ports::{CustomerRef, SubscriptionRepository, TierRepository};

use crate::application::router::{ProviderRouter, Repeat};
use crate::application::state_machine::SubscriptionStateMachine;

/// Command to subscribe a user to a tier.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub email: Option<String>,
    pub tier_id: TierId,
    pub payment_method: PaymentMethod,
    /// Payment-method token collected client-side.
    pub payment_token: Option<String>,
}

/// Result of a successful subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: UserSubscription,
    pub provider_id: ProviderId,
}

/// Handler for creating subscriptions.
///
/// The provider-side subscription is created through the router, so a
/// provider that is down is skipped in favour of the next one. Trial length
/// comes from the current policy.
pub struct CreateSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    tiers: Arc<dyn TierRepository>,
    router: Arc<ProviderRouter>,
    machine: Arc<SubscriptionStateMachine>,
}

impl CreateSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        tiers: Arc<dyn TierRepository>,
        router: Arc<ProviderRouter>,
        machine: Arc<SubscriptionStateMachine>,
    ) -> Self {
        Self {
            subscriptions,
            tiers,
            router,
            machine,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        // 1. One live subscription per user
        if self.subscriptions.find_live_by_user(&cmd.user_id).await?.is_some() {
            return Err(BillingError::ActiveSubscriptionExists(cmd.user_id));
        }

        // 2. Tier must exist and be offered
        let tier = self
            .tiers
            .find_by_id(cmd.tier_id)
            .await?
            .filter(|t| t.active)
            .ok_or(BillingError::TierNotFound(cmd.tier_id))?;

        let policy = self.machine.policy();
        let now = self.machine.now();
        let trial_end = policy.trial_end_from(now);
        let customer = CustomerRef {
            user_id: cmd.user_id.clone(),
            email: cmd.email,
            external_customer_id: None,
            payment_method: cmd.payment_method,
            payment_token: cmd.payment_token,
        };

        // 3. Provider-side subscription, with failover
        let routed = self
            .router
            .execute_with_failover(&tier.price.currency, cmd.payment_method, "create_subscription", |gateway| {
                let tier = tier.clone();
                let customer = customer.clone();
                async move { gateway.create_subscription(&tier, &customer, trial_end).await }
            })
            .await?;

        // 4. Local record
        let subscription = UserSubscription::start(
            NewSubscription {
                user_id: cmd.user_id,
                tier_id: tier.id,
                provider_id: routed.provider.id,
                provider_kind: routed.provider.kind,
                external_ref: routed.value.subscription_ref.clone(),
            },
            &tier,
            &policy,
            now,
        )?;

        if let Err(e) = self.subscriptions.insert(&subscription).await {
            // Lost a race with another request for the same user; undo the
            // provider side so the customer is not billed twice.
            self.cancel_orphan(routed.provider.id, &routed.value.subscription_ref).await;
            return Err(e);
        }

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            provider_id = %routed.provider.id,
            status = %subscription.status,
            "subscription created"
        );
        Ok(CreateSubscriptionResult {
            subscription,
            provider_id: routed.provider.id,
        })
    }

    async fn cancel_orphan(&self, provider_id: ProviderId, external_ref: &str) {
        let result = self
            .router
            .execute_on(provider_id, "cancel_subscription", Repeat::Transient, |gateway| {
                let external_ref = external_ref.to_string();
                async move { gateway.cancel_subscription(&external_ref).await }
            })
            .await;
        if let Err(e) = result {
            tracing::error!(provider_id = %provider_id, external_ref, error = %e, "orphaned provider subscription left active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::TestBed;
    use crate::domain::billing::{ProviderKind, SubscriptionStatus};
    use crate::ports::GatewayError;

    fn handler(bed: &TestBed) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            bed.subscriptions.clone(),
            bed.tiers.clone(),
            bed.router.clone(),
            bed.machine.clone(),
        )
    }

    fn command(bed: &TestBed, user: &str) -> CreateSubscriptionCommand {
        CreateSubscriptionCommand {
            user_id: UserId::new(user).unwrap(),
            email: Some(format!("{}@example.com", user)),
            tier_id: bed.tier.id,
            payment_method: PaymentMethod::Card,
            payment_token: Some("tok_visa".into()),
        }
    }

    #[tokio::test]
    async fn creates_trialing_subscription_on_first_provider() {
        let bed = TestBed::new(Default::default()).await;
        let (provider, gateway) = bed.add_provider(ProviderKind::CardNetwork, 1);

        let result = handler(&bed).handle(command(&bed, "alice")).await.unwrap();

        assert_eq!(result.provider_id, provider.id);
        assert_eq!(result.subscription.status, SubscriptionStatus::Trialing);
        assert_eq!(result.subscription.external_ref, "mock_sub_1");
        assert_eq!(gateway.call_count("create_subscription"), 1);
        assert!(bed.reload(&result.subscription).await.trial_end.is_some());
    }

    #[tokio::test]
    async fn fails_over_when_first_provider_is_down() {
        let bed = TestBed::without_trial().await;
        let (_, primary) = bed.add_provider(ProviderKind::CardNetwork, 1);
        let (backup, _) = bed.add_provider(ProviderKind::Wallet, 2);
        primary.fail_next("create_subscription", GatewayError::transient("503"));

        let result = handler(&bed).handle(command(&bed, "alice")).await.unwrap();

        assert_eq!(result.provider_id, backup.id);
        assert_eq!(result.subscription.provider_kind, ProviderKind::Wallet);
        assert_eq!(result.subscription.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn second_live_subscription_is_refused() {
        let bed = TestBed::without_trial().await;
        let (_, gateway) = bed.add_provider(ProviderKind::CardNetwork, 1);
        handler(&bed).handle(command(&bed, "alice")).await.unwrap();

        let err = handler(&bed).handle(command(&bed, "alice")).await.unwrap_err();

        assert!(matches!(err, BillingError::ActiveSubscriptionExists(_)));
        assert_eq!(gateway.call_count("create_subscription"), 1);
    }

    #[tokio::test]
    async fn unknown_tier_is_refused_before_any_provider_call() {
        let bed = TestBed::without_trial().await;
        let (_, gateway) = bed.add_provider(ProviderKind::CardNetwork, 1);
        let mut cmd = command(&bed, "alice");
        cmd.tier_id = TierId::new();

        let err = handler(&bed).handle(cmd).await.unwrap_err();

        assert!(matches!(err, BillingError::TierNotFound(_)));
        assert_eq!(gateway.call_count("create_subscription"), 0);
    }

    #[tokio::test]
    async fn declined_card_stores_nothing() {
        let bed = TestBed::without_trial().await;
        let (_, gateway) = bed.add_provider(ProviderKind::CardNetwork, 1);
        gateway.fail_next("create_subscription", GatewayError::permanent("card declined"));

        let err = handler(&bed).handle(command(&bed, "alice")).await.unwrap_err();

        assert!(matches!(err, BillingError::ProviderPermanent { .. }));
        let user = UserId::new("alice").unwrap();
        assert!(bed.subscriptions.find_live_by_user(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_provider_means_unavailable() {
        let bed = TestBed::without_trial().await;

        let err = handler(&bed).handle(command(&bed, "alice")).await.unwrap_err();

        assert!(matches!(err, BillingError::ProviderUnavailable { .. }));
    }
}
