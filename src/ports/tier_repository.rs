//! Subscription tier catalog port.

use async_trait::async_trait;

use crate::domain::billing::{BillingError, SubscriptionTier};
use crate::domain::foundation::TierId;

#[async_trait]
pub trait TierRepository: Send + Sync {
    /// Inserts or replaces a tier.
    async fn save(&self, tier: &SubscriptionTier) -> Result<(), BillingError>;

    async fn find_by_id(&self, id: TierId) -> Result<Option<SubscriptionTier>, BillingError>;

    /// All tiers, retired ones included, sorted by name.
    async fn list(&self) -> Result<Vec<SubscriptionTier>, BillingError>;
}
