use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, SubscriptionTier};
use crate::domain::foundation::TierId;
use crate::ports::TierRepository;

#[derive(Default)]
pub struct InMemoryTierRepository {
    tiers: RwLock<HashMap<TierId, SubscriptionTier>>,
}

impl InMemoryTierRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TierRepository for InMemoryTierRepository {
    async fn save(&self, tier: &SubscriptionTier) -> Result<(), BillingError> {
        self.tiers.write().await.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: TierId) -> Result<Option<SubscriptionTier>, BillingError> {
        Ok(self.tiers.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<SubscriptionTier>, BillingError> {
        let mut tiers: Vec<_> = self.tiers.read().await.values().cloned().collect();
        tiers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.created_at.cmp(&b.created_at)));
        Ok(tiers)
    }
}
