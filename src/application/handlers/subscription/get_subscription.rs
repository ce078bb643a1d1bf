//! GetSubscriptionHandler - Query handler for a subscription and its payments.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, PaymentAttempt, SubscriptionTier, UserSubscription};
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::ports::{PaymentAttemptRepository, SubscriptionRepository, TierRepository};

/// Look up by id, or the live subscription of a user.
#[derive(Debug, Clone)]
pub enum GetSubscriptionQuery {
    ById {
        subscription_id: SubscriptionId,
        requested_by: Option<UserId>,
    },
    LiveForUser(UserId),
}

#[derive(Debug, Clone, Serialize)]
pub struct GetSubscriptionResult {
    pub subscription: UserSubscription,
    pub tier: SubscriptionTier,
    pub payments: Vec<PaymentAttempt>,
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    tiers: Arc<dyn TierRepository>,
    attempts: Arc<dyn PaymentAttemptRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        tiers: Arc<dyn TierRepository>,
        attempts: Arc<dyn PaymentAttemptRepository>,
    ) -> Self {
        Self {
            subscriptions,
            tiers,
            attempts,
        }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<GetSubscriptionResult, BillingError> {
        let subscription = match query {
            GetSubscriptionQuery::ById {
                subscription_id,
                requested_by,
            } => self
                .subscriptions
                .find_by_id(subscription_id)
                .await?
                .filter(|s| requested_by.as_ref().map_or(true, |user| &s.user_id == user))
                .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?,
            GetSubscriptionQuery::LiveForUser(user_id) => self
                .subscriptions
                .find_live_by_user(&user_id)
                .await?
                .ok_or_else(|| BillingError::SubscriptionNotFound(format!("live subscription of {}", user_id)))?,
        };

        let tier = self
            .tiers
            .find_by_id(subscription.tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(subscription.tier_id))?;
        let payments = self.attempts.list_for_subscription(subscription.id).await?;

        Ok(GetSubscriptionResult {
            subscription,
            tier,
            payments,
        })
    }
}
