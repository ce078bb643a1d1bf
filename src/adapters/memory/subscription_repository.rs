use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, ProviderKind, SubscriptionStatus, UserSubscription};
use crate::domain::foundation::{ProviderId, SubscriptionId, TierId, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<HashMap<SubscriptionId, UserSubscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn has_deadline_due(sub: &UserSubscription, now: Timestamp) -> bool {
    sub.is_trial_charge_due(now) || sub.is_retry_due(now) || sub.is_grace_expired(now)
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), BillingError> {
        let mut subs = self.subscriptions.write().await;
        if subs
            .values()
            .any(|s| s.user_id == subscription.user_id && s.status.is_live())
        {
            return Err(BillingError::ActiveSubscriptionExists(subscription.user_id.clone()));
        }
        subs.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &UserSubscription) -> Result<u64, BillingError> {
        let mut subs = self.subscriptions.write().await;
        let stored = subs
            .get_mut(&subscription.id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription.id.to_string()))?;
        if stored.version != subscription.version {
            return Err(BillingError::ConcurrentModification(subscription.id));
        }
        let next = subscription.version + 1;
        *stored = UserSubscription {
            version: next,
            ..subscription.clone()
        };
        Ok(next)
    }

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<UserSubscription>, BillingError> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn find_by_external_ref(
        &self,
        kind: ProviderKind,
        external_ref: &str,
    ) -> Result<Option<UserSubscription>, BillingError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| s.provider_kind == kind && s.external_ref == external_ref)
            .cloned())
    }

    async fn find_live_by_user(&self, user_id: &UserId) -> Result<Option<UserSubscription>, BillingError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| &s.user_id == user_id && s.status.is_live())
            .cloned())
    }

    async fn find_needing_attention(&self, now: Timestamp) -> Result<Vec<UserSubscription>, BillingError> {
        let mut due: Vec<_> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| has_deadline_due(s, now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.created_at);
        Ok(due)
    }

    async fn count_by_status(&self) -> Result<HashMap<SubscriptionStatus, u64>, BillingError> {
        let mut counts = HashMap::new();
        for sub in self.subscriptions.read().await.values() {
            *counts.entry(sub.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_by_provider(&self, provider_id: ProviderId) -> Result<u64, BillingError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.provider_id == provider_id)
            .count() as u64)
    }

    async fn count_by_tier(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<HashMap<TierId, u64>, BillingError> {
        let mut counts = HashMap::new();
        for sub in self.subscriptions.read().await.values() {
            if statuses.contains(&sub.status) {
                *counts.entry(sub.tier_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::subscription_fixtures::{subscription, t0, tier};
    use crate::domain::billing::GlobalBillingPolicy;

    #[tokio::test]
    async fn second_live_subscription_for_user_is_refused() {
        let repo = InMemorySubscriptionRepository::new();
        let policy = GlobalBillingPolicy::default();
        let tier = tier();
        repo.insert(&subscription(&policy, &tier)).await.unwrap();

        let err = repo.insert(&subscription(&policy, &tier)).await.unwrap_err();
        assert!(matches!(err, BillingError::ActiveSubscriptionExists(_)));
    }

    #[tokio::test]
    async fn stale_version_update_is_concurrent_modification() {
        let repo = InMemorySubscriptionRepository::new();
        let policy = GlobalBillingPolicy::default();
        let sub = subscription(&policy, &tier());
        repo.insert(&sub).await.unwrap();

        let loaded = repo.find_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(repo.update(&loaded).await.unwrap(), loaded.version + 1);

        let err = repo.update(&loaded).await.unwrap_err();
        assert!(matches!(err, BillingError::ConcurrentModification(_)));
    }

    #[tokio::test]
    async fn trial_end_is_due_at_boundary() {
        let repo = InMemorySubscriptionRepository::new();
        let policy = GlobalBillingPolicy::default();
        let sub = subscription(&policy, &tier());
        repo.insert(&sub).await.unwrap();

        let end = t0().add_days(14);
        assert!(repo.find_needing_attention(end.plus_secs(-1)).await.unwrap().is_empty());
        assert_eq!(repo.find_needing_attention(end).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lookups_by_external_ref_and_user() {
        let repo = InMemorySubscriptionRepository::new();
        let policy = GlobalBillingPolicy::default();
        let sub = subscription(&policy, &tier());
        repo.insert(&sub).await.unwrap();

        assert!(repo
            .find_by_external_ref(ProviderKind::CardNetwork, "sub_ext_1")
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .find_by_external_ref(ProviderKind::Wallet, "sub_ext_1")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            repo.find_live_by_user(&sub.user_id).await.unwrap().unwrap().id,
            sub.id
        );
        assert_eq!(repo.count_by_provider(sub.provider_id).await.unwrap(), 1);
    }
}
