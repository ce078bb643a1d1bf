//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod analytics;
pub mod subscription;
pub mod tier;

pub use analytics::{BillingAnalytics, GetBillingAnalyticsHandler, GetBillingAnalyticsQuery};
pub use subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ChangeTierCommand, ChangeTierHandler,
    CreateSubscriptionCommand, CreateSubscriptionHandler, GetSubscriptionHandler, GetSubscriptionQuery,
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, RefundPaymentCommand,
    RefundPaymentHandler,
};
pub use tier::{
    CreateTierCommand, CreateTierHandler, DeactivateTierCommand, DeactivateTierHandler, ListTiersHandler,
    ListTiersQuery, UpdateTierCommand, UpdateTierHandler,
};
