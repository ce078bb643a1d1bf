//! Lifecycle triggers and the transition table.
//!
//! `next_status` is the single source of truth for which (state, trigger)
//! pairs move a subscription. Anything not listed is not applicable.

use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Inputs that may move a subscription between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTrigger {
    /// A charge succeeded (provider webhook or engine-initiated).
    PaymentSucceeded,
    /// A charge failed (provider webhook).
    PaymentFailed,
    /// Trial reached its end without a successful charge.
    TrialEnded,
    /// Scheduled retries hit the policy maximum.
    RetryExhausted,
    /// Grace-period end passed while still past due.
    GraceExpired,
    /// Manual reactivation backed by a successful charge.
    Reactivated,
    /// Explicit cancel from user, operator or provider.
    CancelRequested,
}

impl LifecycleTrigger {
    pub const ALL: [LifecycleTrigger; 7] = [
        LifecycleTrigger::PaymentSucceeded,
        LifecycleTrigger::PaymentFailed,
        LifecycleTrigger::TrialEnded,
        LifecycleTrigger::RetryExhausted,
        LifecycleTrigger::GraceExpired,
        LifecycleTrigger::Reactivated,
        LifecycleTrigger::CancelRequested,
    ];
}

impl SubscriptionStatus {
    /// Target state for `trigger`, or `None` when the pair is not in the table.
    ///
    /// A target equal to `self` is an accepted no-op (renewal while active,
    /// another failure while already past due).
    pub fn next_status(&self, trigger: LifecycleTrigger) -> Option<SubscriptionStatus> {
        use LifecycleTrigger::*;
        use SubscriptionStatus::*;
        match (self, trigger) {
            (Trialing, PaymentSucceeded) => Some(Active),
            (Trialing, TrialEnded) => Some(Expired),

            (Active, PaymentSucceeded) => Some(Active),
            (Active, PaymentFailed) => Some(PastDue),

            (PastDue, PaymentSucceeded) => Some(Active),
            (PastDue, PaymentFailed) => Some(PastDue),
            (PastDue, RetryExhausted) => Some(Suspended),
            (PastDue, GraceExpired) => Some(Suspended),

            (Suspended, Reactivated) => Some(Active),

            (Trialing | Active | PastDue | Suspended, CancelRequested) => Some(Canceled),

            _ => None,
        }
    }
}
