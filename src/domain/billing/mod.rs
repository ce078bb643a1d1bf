//! Billing domain module.
//!
//! Provider configuration, billing policy, tiers, the subscription lifecycle
//! and webhook event records.
//!
//! # Module Structure
//!
//! - `provider` - Provider configuration versions and credentials
//! - `policy` - Global billing policy
//! - `tier` - Subscription tiers and billing periods
//! - `status` / `lifecycle` - Subscription state machine and its trigger table
//! - `subscription` - UserSubscription aggregate
//! - `normalized_event` - Provider-agnostic webhook events
//! - `webhook_event` - Durable webhook records and their processing states
//! - `payment_attempt` - Append-only charge audit trail
//! - `proration` - Tier-change credit computation
//! - `signature` - HMAC webhook signature verification
//! - `snapshot` - Immutable configuration snapshot

mod errors;
mod lifecycle;
mod normalized_event;
mod payment_attempt;
mod policy;
mod proration;
mod provider;
pub mod signature;
mod snapshot;
mod status;
mod subscription;
mod tier;
mod webhook_event;

pub use errors::BillingError;
pub use lifecycle::LifecycleTrigger;
pub use normalized_event::{NormalizedEvent, NormalizedEventType};
pub use payment_attempt::{ChargeReason, PaymentAttempt, PaymentOutcome};
pub use policy::GlobalBillingPolicy;
pub use proration::{prorated_credit, RoundingRule};
pub use provider::{
    EncryptedCredentials, PaymentMethod, ProviderConfiguration, ProviderCredentials,
    ProviderEnvironment, ProviderKind, MAX_PROVIDER_PRIORITY, MAX_PROVIDER_TIMEOUT_SECS,
};
pub use snapshot::ConfigSnapshot;
pub use status::SubscriptionStatus;
pub use subscription::{NewSubscription, Transition, TransitionContext, UserSubscription};
pub use tier::{BillingPeriod, SubscriptionTier};
pub use webhook_event::{payload_digest, IngestOutcome, WebhookEventRecord, WebhookEventStatus};

#[cfg(test)]
pub(crate) use provider::fixtures as provider_fixtures;
#[cfg(test)]
pub(crate) use subscription::fixtures as subscription_fixtures;
