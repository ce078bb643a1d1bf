//! CreateTierHandler - Adds a tier to the catalog.

use std::sync::Arc;

use crate::domain::billing::{BillingError, BillingPeriod, SubscriptionTier};
use crate::domain::foundation::{Clock, Money};
use crate::ports::{AuditEntry, AuditLog, TierRepository};

use super::clear_other_defaults;

#[derive(Debug, Clone)]
pub struct CreateTierCommand {
    pub actor: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub period: BillingPeriod,
    pub features: Vec<String>,
    pub is_default: bool,
}

pub struct CreateTierHandler {
    tiers: Arc<dyn TierRepository>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl CreateTierHandler {
    pub fn new(tiers: Arc<dyn TierRepository>, audit: Arc<dyn AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self { tiers, audit, clock }
    }

    pub async fn handle(&self, cmd: CreateTierCommand) -> Result<SubscriptionTier, BillingError> {
        let now = self.clock.now();
        let mut tier = SubscriptionTier::new(cmd.name, cmd.price, cmd.period, now)?.with_features(cmd.features);
        if let Some(description) = cmd.description {
            tier = tier.with_description(description);
        }
        tier.is_default = cmd.is_default;

        self.audit
            .append(
                AuditEntry::new(&cmd.actor, "tier.create", format!("tier:{}", tier.id), now)
                    .with_diff(None::<&SubscriptionTier>, Some(&tier)),
            )
            .await?;
        self.tiers.save(&tier).await?;
        if tier.is_default {
            clear_other_defaults(self.tiers.as_ref(), tier.id).await?;
        }

        tracing::info!(tier_id = %tier.id, name = %tier.name, "tier created");
        Ok(tier)
    }
}
