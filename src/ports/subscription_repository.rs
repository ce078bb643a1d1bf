//! Subscription repository port.
//!
//! # Design
//!
//! - **One live subscription per user**: `insert` refuses a second one
//! - **Optimistic locking**: `update` succeeds only when the stored version
//!   equals the aggregate's version, then bumps it
//! - **Scheduler queries**: `find_needing_attention` returns everything with
//!   a time-based duty due

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::billing::{BillingError, ProviderKind, SubscriptionStatus, UserSubscription};
use crate::domain::foundation::{ProviderId, SubscriptionId, TierId, Timestamp, UserId};

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Stores a new subscription.
    ///
    /// # Errors
    ///
    /// - `ActiveSubscriptionExists` if the user already has a live one
    /// - `Storage` on persistence failure
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), BillingError>;

    /// Saves changes, returning the new version.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` when the stored version moved on
    /// - `SubscriptionNotFound` if it was never inserted
    async fn update(&self, subscription: &UserSubscription) -> Result<u64, BillingError>;

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<UserSubscription>, BillingError>;

    async fn find_by_external_ref(
        &self,
        kind: ProviderKind,
        external_ref: &str,
    ) -> Result<Option<UserSubscription>, BillingError>;

    async fn find_live_by_user(&self, user_id: &UserId) -> Result<Option<UserSubscription>, BillingError>;

    /// Subscriptions with a trial, retry or grace deadline at or before `now`.
    async fn find_needing_attention(&self, now: Timestamp) -> Result<Vec<UserSubscription>, BillingError>;

    async fn count_by_status(&self) -> Result<HashMap<SubscriptionStatus, u64>, BillingError>;

    /// Number of subscriptions of any status referencing `provider_id`.
    async fn count_by_provider(&self, provider_id: ProviderId) -> Result<u64, BillingError>;

    /// Subscriptions in any of `statuses`, grouped by tier.
    async fn count_by_tier(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<HashMap<TierId, u64>, BillingError>;
}
