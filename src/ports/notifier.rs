//! Outbound notification ports.
//!
//! Both are fire-and-forget from the engine's point of view: a failed
//! notification is logged and never rolls back a state change.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::billing::{SubscriptionStatus, WebhookEventRecord};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

/// A subscriber-facing status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotification {
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub at: Timestamp,
}

/// Something an operator has to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorAlert {
    /// A webhook event exhausted its processing attempts.
    WebhookFailed {
        provider_kind: String,
        external_event_id: String,
        attempts: u32,
        last_error: Option<String>,
    },
    /// No provider could serve a request.
    AllProvidersUnavailable { operation: String, reason: String },
    /// A provider was marked unhealthy.
    ProviderUnhealthy { provider: String, reason: String },
}

impl OperatorAlert {
    pub fn webhook_failed(record: &WebhookEventRecord) -> Self {
        OperatorAlert::WebhookFailed {
            provider_kind: record.provider_kind.to_string(),
            external_event_id: record.external_event_id.clone(),
            attempts: record.attempts,
            last_error: record.last_error.clone(),
        }
    }
}

#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify_status_change(&self, notification: StatusNotification) -> Result<(), String>;
}

#[async_trait]
pub trait OperatorAlerter: Send + Sync {
    async fn alert(&self, alert: OperatorAlert) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_ports_are_object_safe() {
        fn _accepts_notifier(_n: &dyn UserNotifier) {}
        fn _accepts_alerter(_a: &dyn OperatorAlerter) {}
    }

    #[test]
    fn alert_serializes_with_kind_tag() {
        let alert = OperatorAlert::AllProvidersUnavailable {
            operation: "charge".into(),
            reason: "all down".into(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "all_providers_unavailable");
    }
}
