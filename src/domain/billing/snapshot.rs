//! Immutable configuration snapshot.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ProviderId, Timestamp};

use super::{GlobalBillingPolicy, ProviderConfiguration, ProviderKind};

/// A fully-formed view of every provider's current version plus the policy.
///
/// Readers hold an `Arc<ConfigSnapshot>`; writers build a new one and swap
/// it in, so a reader never observes a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Global version, bumped by every successful write.
    pub version: u64,
    pub providers: Vec<ProviderConfiguration>,
    pub policy: GlobalBillingPolicy,
    pub created_at: Timestamp,
}

impl ConfigSnapshot {
    /// Version-zero snapshot: no providers, default policy.
    pub fn empty(now: Timestamp) -> Self {
        Self {
            version: 0,
            providers: Vec::new(),
            policy: GlobalBillingPolicy::default(),
            created_at: now,
        }
    }

    pub fn provider(&self, id: ProviderId) -> Option<&ProviderConfiguration> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Enabled providers in ascending priority (ties broken by id).
    pub fn active_providers(&self) -> Vec<ProviderConfiguration> {
        let mut active: Vec<_> = self.providers.iter().filter(|p| p.enabled).cloned().collect();
        active.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        active
    }

    /// Every provider of `kind`, enabled or not, in priority order.
    ///
    /// Webhooks for disabled providers still have to be verified.
    pub fn providers_of_kind(&self, kind: ProviderKind) -> Vec<&ProviderConfiguration> {
        let mut matching: Vec<_> = self.providers.iter().filter(|p| p.kind == kind).collect();
        matching.sort_by(|a, b| {
            b.enabled
                .cmp(&a.enabled)
                .then_with(|| a.priority.cmp(&b.priority))
        });
        matching
    }

    /// Next snapshot with `provider` inserted or replacing its previous version.
    pub fn with_provider(&self, provider: ProviderConfiguration, now: Timestamp) -> Self {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.id != provider.id)
            .cloned()
            .collect();
        providers.push(provider);
        Self {
            version: self.version + 1,
            providers,
            policy: self.policy.clone(),
            created_at: now,
        }
    }

    /// Next snapshot without `id`.
    pub fn without_provider(&self, id: ProviderId, now: Timestamp) -> Self {
        Self {
            version: self.version + 1,
            providers: self.providers.iter().filter(|p| p.id != id).cloned().collect(),
            policy: self.policy.clone(),
            created_at: now,
        }
    }

    /// Next snapshot carrying `policy`.
    pub fn with_policy(&self, policy: GlobalBillingPolicy, now: Timestamp) -> Self {
        Self {
            version: self.version + 1,
            providers: self.providers.clone(),
            policy,
            created_at: now,
        }
    }
}
