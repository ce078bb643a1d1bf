//! SubscriptionStateMachine - Serialized, versioned subscription changes.
//!
//! Every change to a subscription goes through [`LockedSubscription::mutate`]:
//!
//! 1. Hold the per-subscription lock
//! 2. Load the current version and build the transition context from the
//!    current policy and the subscription's tier
//! 3. Run the change; save only if something moved
//! 4. On `ConcurrentModification` (another process won), reload and rerun,
//!    up to `lock_retry_attempts` times
//! 5. Notify the user about status changes; a failed notification is logged
//!    and never undoes the change

use std::sync::Arc;

use tokio::sync::{watch, OwnedMutexGuard};

use crate::domain::billing::{
    BillingError, ConfigSnapshot, GlobalBillingPolicy, LifecycleTrigger, NormalizedEvent,
    NormalizedEventType, SubscriptionStatus, SubscriptionTier, Transition, TransitionContext,
    UserSubscription,
};
use crate::domain::foundation::{Clock, SubscriptionId, Timestamp};
use crate::ports::{StatusNotification, SubscriptionRepository, TierRepository, UserNotifier};

use super::locks::SubscriptionLocks;

/// Result of applying one provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEvent {
    /// `None` for event types the engine does not act on.
    pub subscription_id: Option<SubscriptionId>,
    pub transition: Transition,
}

pub struct SubscriptionStateMachine {
    subscriptions: Arc<dyn SubscriptionRepository>,
    tiers: Arc<dyn TierRepository>,
    config: watch::Receiver<Arc<ConfigSnapshot>>,
    locks: Arc<SubscriptionLocks>,
    notifier: Arc<dyn UserNotifier>,
    clock: Arc<dyn Clock>,
    lock_retry_attempts: u32,
}

impl SubscriptionStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        tiers: Arc<dyn TierRepository>,
        config: watch::Receiver<Arc<ConfigSnapshot>>,
        locks: Arc<SubscriptionLocks>,
        notifier: Arc<dyn UserNotifier>,
        clock: Arc<dyn Clock>,
        lock_retry_attempts: u32,
    ) -> Self {
        Self {
            subscriptions,
            tiers,
            config,
            locks,
            notifier,
            clock,
            lock_retry_attempts: lock_retry_attempts.max(1),
        }
    }

    pub fn policy(&self) -> GlobalBillingPolicy {
        self.config.borrow().policy.clone()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn locks(&self) -> &SubscriptionLocks {
        &self.locks
    }

    /// Takes the subscription's lock for a multi-step operation.
    pub async fn lock(&self, id: SubscriptionId) -> LockedSubscription<'_> {
        LockedSubscription {
            machine: self,
            id,
            _guard: self.locks.acquire(id).await,
        }
    }

    /// Locks, changes and saves in one step.
    pub async fn mutate<R, F>(&self, id: SubscriptionId, change: F) -> Result<(UserSubscription, R), BillingError>
    where
        F: FnMut(&mut UserSubscription, &TransitionContext<'_>) -> Result<R, BillingError>,
    {
        self.lock(id).await.mutate(change).await
    }

    pub async fn apply_trigger(
        &self,
        id: SubscriptionId,
        trigger: LifecycleTrigger,
    ) -> Result<(UserSubscription, Transition), BillingError> {
        self.mutate(id, |sub, ctx| sub.apply(trigger, ctx)).await
    }

    /// Applies a normalized provider event to the subscription it references.
    ///
    /// # Errors
    ///
    /// - `MalformedPayload` when an actionable event carries no subscription reference
    /// - `SubscriptionNotFound` when no subscription has that reference (yet)
    /// - `InvalidTransition` when the event makes no sense in the current state
    pub async fn apply_event(&self, event: &NormalizedEvent) -> Result<AppliedEvent, BillingError> {
        if event.event_type == NormalizedEventType::Ignored {
            return Ok(AppliedEvent {
                subscription_id: None,
                transition: Transition::Unchanged,
            });
        }
        let external_ref = event.external_subscription_ref.as_deref().ok_or_else(|| {
            BillingError::MalformedPayload(format!(
                "{} event {} has no subscription reference",
                event.raw_type, event.external_event_id
            ))
        })?;
        let subscription = self
            .subscriptions
            .find_by_external_ref(event.provider_kind, external_ref)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(external_ref.to_string()))?;

        let (_, transition) = self
            .mutate(subscription.id, |sub, ctx| sub.apply_provider_event(event, ctx))
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            event_id = %event.external_event_id,
            event_type = %event.raw_type,
            ?transition,
            "provider event applied"
        );
        Ok(AppliedEvent {
            subscription_id: Some(subscription.id),
            transition,
        })
    }

    async fn notify(&self, from: SubscriptionStatus, sub: &UserSubscription) {
        if from == sub.status {
            return;
        }
        let notification = StatusNotification {
            subscription_id: sub.id,
            user_id: sub.user_id.clone(),
            from,
            to: sub.status,
            at: sub.updated_at,
        };
        if let Err(e) = self.notifier.notify_status_change(notification).await {
            tracing::warn!(subscription_id = %sub.id, error = %e, "status notification not delivered");
        }
    }
}

/// Exclusive access to one subscription until dropped.
pub struct LockedSubscription<'a> {
    machine: &'a SubscriptionStateMachine,
    id: SubscriptionId,
    _guard: OwnedMutexGuard<()>,
}

impl LockedSubscription<'_> {
    /// Current stored version and its tier.
    pub async fn load(&self) -> Result<(UserSubscription, SubscriptionTier), BillingError> {
        let sub = self
            .machine
            .subscriptions
            .find_by_id(self.id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(self.id.to_string()))?;
        let tier = self
            .machine
            .tiers
            .find_by_id(sub.tier_id)
            .await?
            .ok_or(BillingError::TierNotFound(sub.tier_id))?;
        Ok((sub, tier))
    }

    /// Runs `change` on a fresh copy and saves it if anything moved.
    pub async fn mutate<R, F>(&self, mut change: F) -> Result<(UserSubscription, R), BillingError>
    where
        F: FnMut(&mut UserSubscription, &TransitionContext<'_>) -> Result<R, BillingError>,
    {
        let mut attempt = 1;
        loop {
            let (mut sub, tier) = self.load().await?;
            let before = sub.clone();
            let snapshot = self.machine.config.borrow().clone();
            let ctx = TransitionContext::new(self.machine.clock.now(), &snapshot.policy, tier.period);

            let result = change(&mut sub, &ctx)?;
            if sub == before {
                return Ok((sub, result));
            }

            match self.machine.subscriptions.update(&sub).await {
                Ok(version) => {
                    sub.version = version;
                    if before.status != sub.status {
                        tracing::info!(
                            subscription_id = %sub.id,
                            from = %before.status,
                            to = %sub.status,
                            "subscription status changed"
                        );
                    }
                    self.machine.notify(before.status, &sub).await;
                    return Ok((sub, result));
                }
                Err(BillingError::ConcurrentModification(id)) if attempt < self.machine.lock_retry_attempts => {
                    tracing::debug!(subscription_id = %id, attempt, "version conflict, reloading");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
