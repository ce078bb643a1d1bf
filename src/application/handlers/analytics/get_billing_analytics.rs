//! GetBillingAnalyticsHandler - Query handler for the admin dashboard.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::billing::{BillingError, ConfigSnapshot, SubscriptionStatus};
use crate::domain::foundation::{Clock, ProviderId, TierId, Timestamp};
use crate::ports::{PaymentAttemptRepository, SubscriptionRepository, TierRepository};

/// Statuses that count towards recurring revenue.
const REVENUE_STATUSES: [SubscriptionStatus; 2] = [SubscriptionStatus::Active, SubscriptionStatus::PastDue];

#[derive(Debug, Clone, Copy, Default)]
pub struct GetBillingAnalyticsQuery;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierCount {
    pub tier_id: TierId,
    pub name: String,
    pub subscriptions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCount {
    pub provider_id: ProviderId,
    pub display_name: String,
    pub enabled: bool,
    pub subscriptions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingAnalytics {
    pub by_status: BTreeMap<String, u64>,
    /// Revenue-bearing subscriptions per tier.
    pub by_tier: Vec<TierCount>,
    pub by_provider: Vec<ProviderCount>,
    /// Monthly recurring revenue in minor units, per currency code.
    pub monthly_recurring_revenue: BTreeMap<String, i64>,
    pub payment_outcomes: BTreeMap<String, u64>,
    pub generated_at: Timestamp,
}

pub struct GetBillingAnalyticsHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    tiers: Arc<dyn TierRepository>,
    attempts: Arc<dyn PaymentAttemptRepository>,
    config: watch::Receiver<Arc<ConfigSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl GetBillingAnalyticsHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        tiers: Arc<dyn TierRepository>,
        attempts: Arc<dyn PaymentAttemptRepository>,
        config: watch::Receiver<Arc<ConfigSnapshot>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            tiers,
            attempts,
            config,
            clock,
        }
    }

    pub async fn handle(&self, _query: GetBillingAnalyticsQuery) -> Result<BillingAnalytics, BillingError> {
        let mut by_status: BTreeMap<String, u64> = SubscriptionStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        for (status, count) in self.subscriptions.count_by_status().await? {
            by_status.insert(status.as_str().to_string(), count);
        }

        let per_tier = self.subscriptions.count_by_tier(&REVENUE_STATUSES).await?;
        let mut by_tier = Vec::with_capacity(per_tier.len());
        let mut monthly_recurring_revenue = BTreeMap::new();
        for tier in self.tiers.list().await? {
            let Some(&count) = per_tier.get(&tier.id) else {
                continue;
            };
            let monthly = tier.period.monthly_equivalent(tier.price.amount_minor);
            *monthly_recurring_revenue
                .entry(tier.price.currency.to_string())
                .or_insert(0i64) += monthly.saturating_mul(count as i64);
            by_tier.push(TierCount {
                tier_id: tier.id,
                name: tier.name,
                subscriptions: count,
            });
        }

        let snapshot = self.config.borrow().clone();
        let mut by_provider = Vec::with_capacity(snapshot.providers.len());
        for provider in &snapshot.providers {
            by_provider.push(ProviderCount {
                provider_id: provider.id,
                display_name: provider.display_name.clone(),
                enabled: provider.enabled,
                subscriptions: self.subscriptions.count_by_provider(provider.id).await?,
            });
        }

        let payment_outcomes = self
            .attempts
            .count_by_outcome()
            .await?
            .into_iter()
            .map(|(outcome, count)| (outcome.as_str().to_string(), count))
            .collect();

        Ok(BillingAnalytics {
            by_status,
            by_tier,
            by_provider,
            monthly_recurring_revenue,
            payment_outcomes,
            generated_at: self.clock.now(),
        })
    }
}
