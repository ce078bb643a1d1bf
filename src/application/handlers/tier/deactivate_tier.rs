//! DeactivateTierHandler - Stops offering a tier.
//!
//! Existing subscribers keep the tier; new subscriptions cannot pick it.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionTier};
use crate::domain::foundation::{Clock, TierId};
use crate::ports::{AuditEntry, AuditLog, TierRepository};

#[derive(Debug, Clone)]
pub struct DeactivateTierCommand {
    pub actor: String,
    pub tier_id: TierId,
}

pub struct DeactivateTierHandler {
    tiers: Arc<dyn TierRepository>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl DeactivateTierHandler {
    pub fn new(tiers: Arc<dyn TierRepository>, audit: Arc<dyn AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self { tiers, audit, clock }
    }

    pub async fn handle(&self, cmd: DeactivateTierCommand) -> Result<SubscriptionTier, BillingError> {
        let before = self
            .tiers
            .find_by_id(cmd.tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(cmd.tier_id))?;
        if !before.active {
            return Ok(before);
        }
        let mut tier = before.clone();
        tier.active = false;
        tier.is_default = false;

        self.audit
            .append(
                AuditEntry::new(&cmd.actor, "tier.deactivate", format!("tier:{}", tier.id), self.clock.now())
                    .with_diff(Some(&before), Some(&tier)),
            )
            .await?;
        self.tiers.save(&tier).await?;
        tracing::info!(tier_id = %tier.id, "tier deactivated");
        Ok(tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryAuditLog, InMemoryTierRepository};
    use crate::domain::billing::subscription_fixtures::{t0, tier};
    use crate::domain::foundation::ManualClock;

    #[tokio::test]
    async fn deactivation_is_audited_once() {
        let tiers = Arc::new(InMemoryTierRepository::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let pro = tier();
        tiers.save(&pro).await.unwrap();
        let handler = DeactivateTierHandler::new(tiers.clone(), audit.clone(), Arc::new(ManualClock::starting_at(t0())));
        let cmd = DeactivateTierCommand {
            actor: "ops".into(),
            tier_id: pro.id,
        };

        assert!(!handler.handle(cmd.clone()).await.unwrap().active);
        handler.handle(cmd).await.unwrap();

        assert_eq!(audit.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn audit_outage_blocks_the_change() {
        let tiers = Arc::new(InMemoryTierRepository::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        audit.set_unavailable(true);
        let pro = tier();
        tiers.save(&pro).await.unwrap();
        let handler = DeactivateTierHandler::new(tiers.clone(), audit, Arc::new(ManualClock::starting_at(t0())));

        let err = handler
            .handle(DeactivateTierCommand {
                actor: "ops".into(),
                tier_id: pro.id,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::AuditUnavailable(_)));
        assert!(tiers.find_by_id(pro.id).await.unwrap().unwrap().active);
    }
}
