//! UpdateTierHandler - Edits tier metadata and price.
//!
//! Metadata changes apply in place. A price change applies in place only
//! while no live subscription uses the tier; otherwise a successor tier is
//! created with the new price and the old one is retired, pointing at it.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SubscriptionTier};
use crate::domain::foundation::{Clock, Money, TierId};
use crate::ports::{AuditEntry, AuditLog, SubscriptionRepository, TierRepository};

use super::{clear_other_defaults, has_live_subscribers};

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default)]
pub struct UpdateTierCommand {
    pub actor: String,
    pub tier_id: TierId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub features: Option<Vec<String>>,
    pub is_default: Option<bool>,
    pub price: Option<Money>,
}

#[derive(Debug, Clone)]
pub struct UpdateTierResult {
    /// The tier as it now reads; the successor when one was created.
    pub tier: SubscriptionTier,
    /// Set when the edit retired the original tier.
    pub retired: Option<TierId>,
}

pub struct UpdateTierHandler {
    tiers: Arc<dyn TierRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl UpdateTierHandler {
    pub fn new(
        tiers: Arc<dyn TierRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tiers,
            subscriptions,
            audit,
            clock,
        }
    }

    pub async fn handle(&self, cmd: UpdateTierCommand) -> Result<UpdateTierResult, BillingError> {
        let now = self.clock.now();
        let before = self
            .tiers
            .find_by_id(cmd.tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(cmd.tier_id))?;

        let mut edited = before.clone();
        if let Some(name) = cmd.name {
            edited.name = name;
        }
        if let Some(description) = cmd.description {
            edited.description = Some(description);
        }
        if let Some(features) = cmd.features {
            edited.features = features;
        }
        if let Some(is_default) = cmd.is_default {
            edited.is_default = is_default;
        }
        edited.validate()?;

        let price_change = cmd.price.filter(|p| p != &before.price);
        let frozen = match price_change {
            Some(_) => has_live_subscribers(self.subscriptions.as_ref(), before.id).await?,
            None => false,
        };
        let (tier, retired) = match price_change {
            Some(price) if frozen => {
                let successor = edited.successor_with_price(price, now)?;
                let mut old = before.clone();
                old.active = false;
                old.is_default = false;
                old.replaced_by = Some(successor.id);

                self.audit
                    .append(
                        AuditEntry::new(&cmd.actor, "tier.reprice", format!("tier:{}", before.id), now)
                            .with_diff(Some(&before), Some(&successor)),
                    )
                    .await?;
                self.tiers.save(&successor).await?;
                self.tiers.save(&old).await?;
                tracing::info!(tier_id = %before.id, successor_id = %successor.id, "tier repriced via successor");
                (successor, Some(before.id))
            }
            price => {
                if let Some(price) = price {
                    edited.price = price;
                    edited.validate()?;
                }
                self.audit
                    .append(
                        AuditEntry::new(&cmd.actor, "tier.update", format!("tier:{}", before.id), now)
                            .with_diff(Some(&before), Some(&edited)),
                    )
                    .await?;
                self.tiers.save(&edited).await?;
                tracing::info!(tier_id = %edited.id, "tier updated");
                (edited, None)
            }
        };

        if tier.is_default {
            clear_other_defaults(self.tiers.as_ref(), tier.id).await?;
        }
        Ok(UpdateTierResult { tier, retired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::TestBed;
    use crate::adapters::memory::InMemoryAuditLog;
    use crate::domain::billing::ProviderKind;

    fn handler(bed: &TestBed, audit: Arc<InMemoryAuditLog>) -> UpdateTierHandler {
        UpdateTierHandler::new(bed.tiers.clone(), bed.subscriptions.clone(), audit, Arc::new(bed.clock.clone()))
    }

    fn reprice(bed: &TestBed, amount: i64) -> UpdateTierCommand {
        UpdateTierCommand {
            actor: "ops".into(),
            tier_id: bed.tier.id,
            price: Some(Money::new(amount, bed.tier.price.currency.clone())),
            ..UpdateTierCommand::default()
        }
    }

    #[tokio::test]
    async fn unused_tier_is_repriced_in_place() {
        let bed = TestBed::without_trial().await;
        let audit = Arc::new(InMemoryAuditLog::new());

        let result = handler(&bed, audit.clone()).handle(reprice(&bed, 4000)).await.unwrap();

        assert_eq!(result.tier.id, bed.tier.id);
        assert_eq!(result.tier.price.amount_minor, 4000);
        assert!(result.retired.is_none());
        assert_eq!(audit.entries().await[0].action, "tier.update");
    }

    #[tokio::test]
    async fn referenced_tier_gets_a_successor() {
        let bed = TestBed::without_trial().await;
        let (provider, _) = bed.add_provider(ProviderKind::CardNetwork, 1);
        let sub = bed.subscribe(&provider, "mock_sub_1").await;
        let audit = Arc::new(InMemoryAuditLog::new());

        let result = handler(&bed, audit.clone()).handle(reprice(&bed, 4000)).await.unwrap();

        assert_ne!(result.tier.id, bed.tier.id);
        assert_eq!(result.retired, Some(bed.tier.id));
        let old = bed.tiers.find_by_id(bed.tier.id).await.unwrap().unwrap();
        assert!(!old.active);
        assert_eq!(old.price, bed.tier.price);
        assert_eq!(old.replaced_by, Some(result.tier.id));
        // Existing subscribers keep their tier and price.
        assert_eq!(bed.reload(&sub).await.tier_id, bed.tier.id);
        assert_eq!(audit.entries().await[0].action, "tier.reprice");
    }

    #[tokio::test]
    async fn metadata_edit_keeps_the_id() {
        let bed = TestBed::without_trial().await;
        let (provider, _) = bed.add_provider(ProviderKind::CardNetwork, 1);
        bed.subscribe(&provider, "mock_sub_1").await;

        let result = handler(&bed, Arc::new(InMemoryAuditLog::new()))
            .handle(UpdateTierCommand {
                actor: "ops".into(),
                tier_id: bed.tier.id,
                name: Some("Pro Plus".into()),
                ..UpdateTierCommand::default()
            })
            .await
            .unwrap();

        assert_eq!(result.tier.id, bed.tier.id);
        assert_eq!(result.tier.name, "Pro Plus");
    }
}
