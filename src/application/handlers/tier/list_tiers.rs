//! ListTiersHandler - Query handler for the tier catalog.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionTier};
use crate::ports::TierRepository;

#[derive(Debug, Clone, Copy, Default)]
pub struct ListTiersQuery {
    /// Include retired and deactivated tiers.
    pub include_inactive: bool,
}

pub struct ListTiersHandler {
    tiers: Arc<dyn TierRepository>,
}

impl ListTiersHandler {
    pub fn new(tiers: Arc<dyn TierRepository>) -> Self {
        Self { tiers }
    }

    pub async fn handle(&self, query: ListTiersQuery) -> Result<Vec<SubscriptionTier>, BillingError> {
        let mut tiers = self.tiers.list().await?;
        if !query.include_inactive {
            tiers.retain(|t| t.active);
        }
        Ok(tiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTierRepository;
    use crate::domain::billing::subscription_fixtures::tier;

    #[tokio::test]
    async fn inactive_tiers_are_hidden_by_default() {
        let repo = Arc::new(InMemoryTierRepository::new());
        let live = tier();
        let mut retired = tier();
        retired.active = false;
        repo.save(&live).await.unwrap();
        repo.save(&retired).await.unwrap();
        let handler = ListTiersHandler::new(repo);

        assert_eq!(handler.handle(ListTiersQuery::default()).await.unwrap(), vec![live]);
        assert_eq!(
            handler
                .handle(ListTiersQuery { include_inactive: true })
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
