//! Provider-agnostic webhook events.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, Timestamp};

use super::{LifecycleTrigger, ProviderKind};

/// Kind of a normalized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedEventType {
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionCanceled,
    /// Recognised envelope, but nothing the lifecycle reacts to.
    Ignored,
}

impl NormalizedEventType {
    /// Lifecycle trigger this event drives, if any.
    pub fn trigger(&self) -> Option<LifecycleTrigger> {
        match self {
            NormalizedEventType::PaymentSucceeded => Some(LifecycleTrigger::PaymentSucceeded),
            NormalizedEventType::PaymentFailed => Some(LifecycleTrigger::PaymentFailed),
            NormalizedEventType::SubscriptionCanceled => Some(LifecycleTrigger::CancelRequested),
            NormalizedEventType::Ignored => None,
        }
    }
}

/// A webhook payload translated out of the provider's dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub provider_kind: ProviderKind,
    /// Provider-issued event id; unique per provider.
    pub external_event_id: String,
    pub event_type: NormalizedEventType,
    /// The provider's own name for the event (e.g. `invoice.paid`).
    pub raw_type: String,
    /// Provider subscription id the event refers to.
    pub external_subscription_ref: Option<String>,
    pub amount: Option<Money>,
    /// New period end reported by the provider on successful renewals.
    pub period_end: Option<Timestamp>,
    pub provider_status: Option<String>,
    pub occurred_at: Timestamp,
}

impl NormalizedEvent {
    pub fn trigger(&self) -> Option<LifecycleTrigger> {
        self.event_type.trigger()
    }
}
