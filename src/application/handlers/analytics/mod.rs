//! Analytics handlers.

mod get_billing_analytics;

pub use get_billing_analytics::{
    BillingAnalytics, GetBillingAnalyticsHandler, GetBillingAnalyticsQuery, ProviderCount, TierCount,
};
