//! Subscription tiers.
//!
//! A tier's price is frozen once any live subscription references it; a
//! price change produces a successor tier instead.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, TierId, Timestamp, ValidationError};

/// Length of one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn days(&self) -> i64 {
        match self {
            BillingPeriod::Monthly => 30,
            BillingPeriod::Yearly => 365,
        }
    }

    /// End of a period starting at `start`.
    pub fn end_from(&self, start: Timestamp) -> Timestamp {
        start.add_days(self.days())
    }

    /// Monthly-equivalent of `amount_minor` (integer division).
    pub fn monthly_equivalent(&self, amount_minor: i64) -> i64 {
        match self {
            BillingPeriod::Monthly => amount_minor,
            BillingPeriod::Yearly => amount_minor / 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    pub id: TierId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub period: BillingPeriod,
    pub features: Vec<String>,
    pub active: bool,
    pub is_default: bool,
    /// Set when a price change retired this tier in favour of another.
    pub replaced_by: Option<TierId>,
    pub created_at: Timestamp,
}

impl SubscriptionTier {
    pub fn new(
        name: impl Into<String>,
        price: Money,
        period: BillingPeriod,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let tier = Self {
            id: TierId::new(),
            name: name.into(),
            description: None,
            price,
            period,
            features: Vec::new(),
            active: true,
            is_default: false,
            replaced_by: None,
            created_at: now,
        };
        tier.validate()?;
        Ok(tier)
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_feature(&self, flag: &str) -> bool {
        self.features.iter().any(|f| f == flag)
    }

    /// Builds the successor tier carrying a new price.
    ///
    /// Metadata and flags are copied; the successor gets a fresh id.
    pub fn successor_with_price(&self, price: Money, now: Timestamp) -> Result<Self, ValidationError> {
        let next = Self {
            id: TierId::new(),
            price,
            replaced_by: None,
            created_at: now,
            ..self.clone()
        };
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if self.name.len() > 100 {
            return Err(ValidationError::out_of_range(
                "name",
                1,
                100,
                self.name.len() as i64,
            ));
        }
        if self.price.amount_minor < 0 {
            return Err(ValidationError::out_of_range(
                "price",
                0,
                i64::MAX,
                self.price.amount_minor,
            ));
        }
        Ok(())
    }
}
