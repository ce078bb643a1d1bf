//! Subscription status state machine.
//!
//! `Trialing -> Active -> PastDue -> Suspended`, with `Canceled` reachable
//! from every live state and `Expired` ending trials that never converted.
//! The triggers that move between these states live in [`super::lifecycle`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial running; no successful charge yet.
    Trialing,

    /// Paid and current.
    Active,

    /// Payment failed; inside the grace window while retries run.
    PastDue,

    /// Retries or grace exhausted. Needs manual reactivation.
    Suspended,

    /// Ended by user, operator or provider. Terminal.
    Canceled,

    /// Trial ended without conversion. Terminal.
    Expired,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 6] = [
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::Expired,
    ];

    /// Non-terminal; at most one live subscription exists per user.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the user should currently have paid-feature access.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown status '{}'", s))
            })
    }
}

impl StateMachine for SubscriptionStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trialing => vec![Active, Expired, Canceled],
            Active => vec![PastDue, Canceled],
            PastDue => vec![Active, Suspended, Canceled],
            Suspended => vec![Active, Canceled],
            Canceled | Expired => vec![],
        }
    }
}
