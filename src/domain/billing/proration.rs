//! Proration credit for mid-period tier changes.
//!
//! credit = unused / period × old price, where unused and period are measured
//! in fractional days (computed on seconds). How the fractional minor unit is
//! resolved is a policy choice carried in [`RoundingRule`].

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, Timestamp};

/// How a fractional minor unit is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Round half away from zero.
    #[default]
    HalfUp,
    /// Banker's rounding.
    HalfEven,
    /// Truncate toward zero (favours the merchant).
    Down,
    /// Round up (favours the customer).
    Up,
}

impl RoundingRule {
    /// Divides `numerator / denominator` for non-negative operands.
    fn divide(&self, numerator: i128, denominator: i128) -> i128 {
        let quotient = numerator / denominator;
        let remainder = numerator % denominator;
        if remainder == 0 {
            return quotient;
        }
        match self {
            RoundingRule::Down => quotient,
            RoundingRule::Up => quotient + 1,
            RoundingRule::HalfUp => {
                if remainder * 2 >= denominator {
                    quotient + 1
                } else {
                    quotient
                }
            }
            RoundingRule::HalfEven => match (remainder * 2).cmp(&denominator) {
                std::cmp::Ordering::Greater => quotient + 1,
                std::cmp::Ordering::Less => quotient,
                std::cmp::Ordering::Equal if quotient % 2 == 0 => quotient,
                std::cmp::Ordering::Equal => quotient + 1,
            },
        }
    }
}

/// Credit owed for the unused part of the current period at the old price.
///
/// Returns zero for degenerate periods, for negative prices and when `now`
/// is at or past the period end; returns the full price when `now` precedes
/// the period start.
pub fn prorated_credit(
    old_price: &Money,
    period_start: Timestamp,
    period_end: Timestamp,
    now: Timestamp,
    rule: RoundingRule,
) -> Money {
    let period_secs = period_end.duration_since(&period_start).num_seconds();
    if period_secs <= 0 || old_price.amount_minor <= 0 {
        return Money::zero(old_price.currency.clone());
    }

    let unused_secs = period_end
        .duration_since(&now)
        .num_seconds()
        .clamp(0, period_secs);

    let numerator = i128::from(old_price.amount_minor) * i128::from(unused_secs);
    let credit = rule.divide(numerator, i128::from(period_secs));

    // credit <= price because unused <= period
    Money::new(credit as i64, old_price.currency.clone())
}
