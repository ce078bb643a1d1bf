//! Global billing policy.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Currency, Timestamp, ValidationError};

use super::RoundingRule;

/// Process-wide billing policy. Versioned like provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalBillingPolicy {
    pub version: u64,
    pub default_currency: Currency,
    pub grace_period_days: u32,
    pub trial_enabled: bool,
    pub default_trial_days: u32,
    pub max_payment_retries: u32,
    pub retry_interval_days: u32,
    /// Charge the outstanding amount when a trial ends.
    pub auto_bill_outstanding: bool,
    pub proration_enabled: bool,
    pub proration_rounding: RoundingRule,
}

impl GlobalBillingPolicy {
    /// End of the grace window for a subscription that went past due at `since`.
    pub fn grace_end_from(&self, since: Timestamp) -> Timestamp {
        since.add_days(i64::from(self.grace_period_days))
    }

    /// Trial end for a subscription started at `start`, if trials are on.
    pub fn trial_end_from(&self, start: Timestamp) -> Option<Timestamp> {
        (self.trial_enabled && self.default_trial_days > 0)
            .then(|| start.add_days(i64::from(self.default_trial_days)))
    }

    /// When the next scheduled retry is due.
    ///
    /// Retries are spaced `retry_interval_days` apart from the moment the
    /// subscription went past due: attempt n is due at since + n × interval.
    pub fn next_retry_at(&self, past_due_since: Timestamp, retries_done: u32) -> Timestamp {
        let n = i64::from(retries_done) + 1;
        past_due_since.add_days(n * i64::from(self.retry_interval_days))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_payment_retries == 0 || self.max_payment_retries > 10 {
            return Err(ValidationError::out_of_range(
                "max_payment_retries",
                1,
                10,
                i64::from(self.max_payment_retries),
            ));
        }
        if self.retry_interval_days == 0 || self.retry_interval_days > 30 {
            return Err(ValidationError::out_of_range(
                "retry_interval_days",
                1,
                30,
                i64::from(self.retry_interval_days),
            ));
        }
        if self.grace_period_days > 90 {
            return Err(ValidationError::out_of_range(
                "grace_period_days",
                0,
                90,
                i64::from(self.grace_period_days),
            ));
        }
        if self.default_trial_days > 365 {
            return Err(ValidationError::out_of_range(
                "default_trial_days",
                0,
                365,
                i64::from(self.default_trial_days),
            ));
        }
        Ok(())
    }
}

impl Default for GlobalBillingPolicy {
    fn default() -> Self {
        Self {
            version: 1,
            default_currency: Currency::usd(),
            grace_period_days: 7,
            trial_enabled: true,
            default_trial_days: 14,
            max_payment_retries: 3,
            retry_interval_days: 3,
            auto_bill_outstanding: true,
            proration_enabled: true,
            proration_rounding: RoundingRule::HalfUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000).unwrap()
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(GlobalBillingPolicy::default().validate().is_ok());
    }

    #[test]
    fn retries_are_spaced_by_interval() {
        let policy = GlobalBillingPolicy {
            retry_interval_days: 3,
            ..Default::default()
        };
        assert_eq!(policy.next_retry_at(t0(), 0), t0().add_days(3));
        assert_eq!(policy.next_retry_at(t0(), 2), t0().add_days(9));
    }

    #[test]
    fn trial_end_is_none_when_trials_disabled() {
        let policy = GlobalBillingPolicy {
            trial_enabled: false,
            ..Default::default()
        };
        assert!(policy.trial_end_from(t0()).is_none());
    }

    #[test]
    fn trial_end_adds_default_days() {
        let policy = GlobalBillingPolicy::default();
        assert_eq!(policy.trial_end_from(t0()), Some(t0().add_days(14)));
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let policy = GlobalBillingPolicy {
            max_payment_retries: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn validate_rejects_long_grace() {
        let policy = GlobalBillingPolicy {
            grace_period_days: 365,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }
}
