//! Tier catalog handlers.
//!
//! Administrative writes to the tier catalog. Each write is audited. At most
//! one tier is the default; a tier's price is frozen while live
//! subscriptions reference it.

mod create_tier;
mod deactivate_tier;
mod list_tiers;
mod update_tier;

pub use create_tier::{CreateTierCommand, CreateTierHandler};
pub use deactivate_tier::{DeactivateTierCommand, DeactivateTierHandler};
pub use list_tiers::{ListTiersHandler, ListTiersQuery};
pub use update_tier::{UpdateTierCommand, UpdateTierHandler, UpdateTierResult};

use crate::domain::billing::{BillingError, SubscriptionStatus};
use crate::domain::foundation::TierId;
use crate::ports::{SubscriptionRepository, TierRepository};

/// Drops the default flag from every tier except `keep`.
async fn clear_other_defaults(tiers: &dyn TierRepository, keep: TierId) -> Result<(), BillingError> {
    for mut tier in tiers.list().await? {
        if tier.id != keep && tier.is_default {
            tier.is_default = false;
            tiers.save(&tier).await?;
        }
    }
    Ok(())
}

/// Whether any non-terminal subscription is on `tier_id`.
async fn has_live_subscribers(
    subscriptions: &dyn SubscriptionRepository,
    tier_id: TierId,
) -> Result<bool, BillingError> {
    let live: Vec<SubscriptionStatus> = SubscriptionStatus::ALL
        .into_iter()
        .filter(SubscriptionStatus::is_live)
        .collect();
    let counts = subscriptions.count_by_tier(&live).await?;
    Ok(counts.get(&tier_id).copied().unwrap_or(0) > 0)
}
