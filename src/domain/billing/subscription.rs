//! UserSubscription aggregate.
//!
//! # Invariants
//!
//! - Status only changes along the lifecycle table (`SubscriptionStatus::next_status`)
//! - `PastDue` always carries `past_due_since`, `grace_period_end` and `next_retry_at`
//! - Provider events older than the last applied one never move state
//! - `version` is the optimistic-concurrency token; repositories bump it on save

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Money, ProviderId, SubscriptionId, TierId, Timestamp, UserId, ValidationError,
};

use super::{
    prorated_credit, BillingError, BillingPeriod, GlobalBillingPolicy, LifecycleTrigger,
    NormalizedEvent, ProviderKind, SubscriptionStatus, SubscriptionTier,
};

/// Inputs for a freshly created subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: UserId,
    pub tier_id: TierId,
    pub provider_id: ProviderId,
    pub provider_kind: ProviderKind,
    pub external_ref: String,
}

/// Everything a transition may need besides the aggregate itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub now: Timestamp,
    pub policy: &'a GlobalBillingPolicy,
    pub period: BillingPeriod,
    /// Period end reported by the provider, when it told us one.
    pub reported_period_end: Option<Timestamp>,
}

impl<'a> TransitionContext<'a> {
    pub fn new(now: Timestamp, policy: &'a GlobalBillingPolicy, period: BillingPeriod) -> Self {
        Self {
            now,
            policy,
            period,
            reported_period_end: None,
        }
    }

    pub fn with_period_end(mut self, period_end: Option<Timestamp>) -> Self {
        self.reported_period_end = period_end;
        self
    }
}

/// What applying a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transition {
    Changed {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    /// Successful payment on an active subscription extended the period.
    Renewed,
    /// Target equals current state; nothing to do.
    Unchanged,
    /// Provider event older than the last one applied.
    Stale,
    /// This exact provider event was applied before.
    AlreadyApplied,
}

impl Transition {
    pub fn changed_status(&self) -> Option<(SubscriptionStatus, SubscriptionStatus)> {
        match self {
            Transition::Changed { from, to } => Some((*from, *to)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub tier_id: TierId,
    pub provider_id: ProviderId,
    pub provider_kind: ProviderKind,
    /// Subscription id at the provider.
    pub external_ref: String,
    pub status: SubscriptionStatus,
    pub trial_end: Option<Timestamp>,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub grace_period_end: Option<Timestamp>,
    pub past_due_since: Option<Timestamp>,
    pub retry_count: u32,
    pub next_retry_at: Option<Timestamp>,
    /// Proration credit to subtract from the next engine-initiated charge.
    pub pending_credit: Option<Money>,
    pub last_event_at: Option<Timestamp>,
    pub last_event_id: Option<String>,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub version: u64,
}

impl UserSubscription {
    /// Starts a subscription: `Trialing` when the policy grants a trial,
    /// otherwise `Active` for one period.
    pub fn start(
        new: NewSubscription,
        tier: &SubscriptionTier,
        policy: &GlobalBillingPolicy,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        if new.external_ref.trim().is_empty() {
            return Err(ValidationError::empty_field("external_ref").into());
        }
        let trial_end = policy.trial_end_from(now);
        let (status, period_end) = match trial_end {
            Some(end) => (SubscriptionStatus::Trialing, end),
            None => (SubscriptionStatus::Active, tier.period.end_from(now)),
        };

        Ok(Self {
            id: SubscriptionId::new(),
            user_id: new.user_id,
            tier_id: new.tier_id,
            provider_id: new.provider_id,
            provider_kind: new.provider_kind,
            external_ref: new.external_ref,
            status,
            trial_end,
            current_period_start: now,
            current_period_end: period_end,
            grace_period_end: None,
            past_due_since: None,
            retry_count: 0,
            next_retry_at: None,
            pending_credit: None,
            last_event_at: None,
            last_event_id: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Applies a lifecycle trigger.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the (status, trigger) pair is not in the table.
    pub fn apply(
        &mut self,
        trigger: LifecycleTrigger,
        ctx: &TransitionContext<'_>,
    ) -> Result<Transition, BillingError> {
        let from = self.status;
        let target = from
            .next_status(trigger)
            .ok_or(BillingError::InvalidTransition { from, trigger })?;

        if target == from {
            if from == SubscriptionStatus::Active && trigger == LifecycleTrigger::PaymentSucceeded {
                self.renew(ctx);
                self.consume_credit();
                return Ok(Transition::Renewed);
            }
            return Ok(Transition::Unchanged);
        }

        self.status = target;
        self.on_enter(from, target, ctx);
        if matches!(trigger, LifecycleTrigger::PaymentSucceeded | LifecycleTrigger::Reactivated) {
            self.consume_credit();
        }
        self.updated_at = ctx.now;
        Ok(Transition::Changed { from, to: target })
    }

    /// Applies a provider event, ignoring duplicates and out-of-order deliveries.
    ///
    /// Events are ordered by provider timestamp, not arrival; an event older
    /// than the last applied one is acknowledged but does not move state.
    pub fn apply_provider_event(
        &mut self,
        event: &NormalizedEvent,
        ctx: &TransitionContext<'_>,
    ) -> Result<Transition, BillingError> {
        if self.last_event_id.as_deref() == Some(event.external_event_id.as_str()) {
            return Ok(Transition::AlreadyApplied);
        }
        if let Some(last) = self.last_event_at {
            if event.occurred_at.is_before(&last) {
                return Ok(Transition::Stale);
            }
        }
        let trigger = match event.trigger() {
            Some(trigger) => trigger,
            None => return Ok(Transition::Unchanged),
        };

        let ctx = ctx.with_period_end(event.period_end);
        let transition = self.apply(trigger, &ctx)?;
        self.last_event_at = Some(event.occurred_at);
        self.last_event_id = Some(event.external_event_id.clone());
        self.updated_at = ctx.now;
        Ok(transition)
    }

    /// Records one failed scheduled retry.
    ///
    /// Suspends immediately once the policy maximum is reached, regardless
    /// of remaining grace time; otherwise schedules the next attempt.
    pub fn record_failed_retry(
        &mut self,
        ctx: &TransitionContext<'_>,
    ) -> Result<Transition, BillingError> {
        if self.status != SubscriptionStatus::PastDue {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                trigger: LifecycleTrigger::RetryExhausted,
            });
        }
        self.retry_count += 1;
        self.updated_at = ctx.now;

        if self.retry_count >= ctx.policy.max_payment_retries {
            return self.apply(LifecycleTrigger::RetryExhausted, ctx);
        }
        let since = self.past_due_since.unwrap_or(ctx.now);
        self.next_retry_at = Some(ctx.policy.next_retry_at(since, self.retry_count));
        Ok(Transition::Unchanged)
    }

    /// Records a trial-end charge that failed for a transient reason.
    ///
    /// The subscription stays `Trialing` and the charge is retried on the
    /// retry interval counted from `trial_end`. Once the policy maximum of
    /// retries has also failed the trial expires.
    pub fn record_failed_trial_charge(
        &mut self,
        ctx: &TransitionContext<'_>,
    ) -> Result<Transition, BillingError> {
        if self.status != SubscriptionStatus::Trialing {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                trigger: LifecycleTrigger::TrialEnded,
            });
        }
        self.retry_count += 1;
        self.updated_at = ctx.now;

        if self.retry_count > ctx.policy.max_payment_retries {
            return self.apply(LifecycleTrigger::TrialEnded, ctx);
        }
        let since = self.trial_end.unwrap_or(ctx.now);
        self.next_retry_at = Some(ctx.policy.next_retry_at(since, self.retry_count - 1));
        Ok(Transition::Unchanged)
    }

    /// Switches an active subscription to another tier.
    ///
    /// Returns the proration credit added for the unused part of the period
    /// at the old price (zero when proration is disabled).
    pub fn change_tier(
        &mut self,
        old_tier: &SubscriptionTier,
        new_tier: &SubscriptionTier,
        policy: &GlobalBillingPolicy,
        now: Timestamp,
    ) -> Result<Money, BillingError> {
        if self.status != SubscriptionStatus::Active {
            return Err(ValidationError::invalid_format(
                "status",
                format!("tier changes require an active subscription, found {}", self.status),
            )
            .into());
        }
        if old_tier.id != self.tier_id {
            return Err(ValidationError::invalid_format("tier_id", "old tier does not match").into());
        }
        if new_tier.id == self.tier_id {
            return Err(ValidationError::invalid_format("tier_id", "already on this tier").into());
        }
        if !new_tier.active {
            return Err(BillingError::TierNotFound(new_tier.id));
        }
        if new_tier.price.currency != old_tier.price.currency {
            return Err(ValidationError::invalid_format("currency", "tiers use different currencies").into());
        }

        let credit = if policy.proration_enabled {
            prorated_credit(
                &old_tier.price,
                self.current_period_start,
                self.current_period_end,
                now,
                policy.proration_rounding,
            )
        } else {
            Money::zero(old_tier.price.currency.clone())
        };

        let total = match &self.pending_credit {
            Some(existing) => existing.checked_add(&credit).unwrap_or_else(|| credit.clone()),
            None => credit.clone(),
        };
        self.pending_credit = (!total.is_zero()).then_some(total);
        self.tier_id = new_tier.id;
        self.updated_at = now;
        Ok(credit)
    }

    /// Amount the next engine-initiated charge should collect.
    pub fn amount_due(&self, tier: &SubscriptionTier) -> Money {
        match &self.pending_credit {
            Some(credit) => tier
                .price
                .saturating_sub(credit)
                .unwrap_or_else(|| tier.price.clone()),
            None => tier.price.clone(),
        }
    }

    /// Drops the pending credit once a successful payment has settled it.
    fn consume_credit(&mut self) {
        self.pending_credit = None;
    }

    pub fn is_trial_over(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::Trialing
            && self.trial_end.map(|end| !now.is_before(&end)).unwrap_or(false)
    }

    /// Trial is over and no deferred trial charge is scheduled later than `now`.
    pub fn is_trial_charge_due(&self, now: Timestamp) -> bool {
        self.is_trial_over(now) && self.next_retry_at.map(|at| !now.is_before(&at)).unwrap_or(true)
    }

    pub fn is_retry_due(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::PastDue
            && self.next_retry_at.map(|at| !now.is_before(&at)).unwrap_or(false)
    }

    pub fn is_grace_expired(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::PastDue
            && self.grace_period_end.map(|end| !now.is_before(&end)).unwrap_or(false)
    }

    fn renew(&mut self, ctx: &TransitionContext<'_>) {
        let start = if self.current_period_end.is_after(&ctx.now) {
            self.current_period_end
        } else {
            ctx.now
        };
        self.current_period_start = start;
        self.current_period_end = ctx
            .reported_period_end
            .filter(|end| end.is_after(&start))
            .unwrap_or_else(|| ctx.period.end_from(start));
        self.updated_at = ctx.now;
    }

    fn on_enter(
        &mut self,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
        ctx: &TransitionContext<'_>,
    ) {
        use SubscriptionStatus::*;
        match to {
            Active => {
                self.clear_dunning();
                self.current_period_start = ctx.now;
                self.current_period_end = ctx
                    .reported_period_end
                    .filter(|end| end.is_after(&ctx.now))
                    .unwrap_or_else(|| ctx.period.end_from(ctx.now));
            }
            PastDue => {
                self.retry_count = 0;
                self.past_due_since = Some(ctx.now);
                self.grace_period_end = Some(ctx.policy.grace_end_from(ctx.now));
                self.next_retry_at = Some(ctx.policy.next_retry_at(ctx.now, 0));
            }
            Suspended => {
                self.next_retry_at = None;
            }
            Canceled => {
                self.next_retry_at = None;
                self.canceled_at = Some(ctx.now);
            }
            Expired => {
                debug_assert_eq!(from, Trialing);
                self.next_retry_at = None;
            }
            Trialing => {}
        }
    }

    fn clear_dunning(&mut self) {
        self.retry_count = 0;
        self.past_due_since = None;
        self.grace_period_end = None;
        self.next_retry_at = None;
    }
}
