//! Mock gateway for testing.
//!
//! Provides a scriptable implementation of `ProviderGateway` for unit and
//! integration tests. Supports:
//! - Error injection per operation (one-shot or persistent)
//! - Artificial latency (to exercise timeouts)
//! - Call tracking
//! - A simple signed webhook dialect (`Mock-Signature`, hex HMAC of the body)

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::billing::{
    signature, NormalizedEvent, NormalizedEventType, ProviderKind, SubscriptionTier,
};
use crate::domain::foundation::{Money, Timestamp};
use crate::ports::{
    ChargeReceipt, ConnectivityReport, CustomerRef, ExternalRef, GatewayError, ProviderGateway,
    RefundReceipt, WebhookHeaders,
};

pub const MOCK_SIGNATURE_HEADER: &str = "Mock-Signature";

/// Recorded call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub argument: String,
}

#[derive(Default)]
struct MockState {
    one_shot: HashMap<&'static str, VecDeque<GatewayError>>,
    persistent: HashMap<&'static str, GatewayError>,
    delay: Option<Duration>,
    unreachable: bool,
    calls: Vec<MockCall>,
    sequence: u64,
}

/// Scriptable gateway. Clones share state.
#[derive(Clone)]
pub struct MockGateway {
    kind: ProviderKind,
    webhook_secret: String,
    inner: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new(kind: ProviderKind) -> Self {
        Self::with_secret(kind, "mock_webhook_secret")
    }

    pub fn with_secret(kind: ProviderKind, webhook_secret: impl Into<String>) -> Self {
        Self {
            kind,
            webhook_secret: webhook_secret.into(),
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fails the next call to `operation` with `error`.
    pub fn fail_next(&self, operation: &'static str, error: GatewayError) {
        self.state()
            .one_shot
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fails every call to `operation` until cleared.
    pub fn fail_always(&self, operation: &'static str, error: GatewayError) {
        self.state().persistent.insert(operation, error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.one_shot.clear();
        state.persistent.clear();
    }

    /// Delays every remote call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Makes connectivity probes fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Signs `body` the way this mock expects.
    pub fn sign(&self, body: &[u8]) -> WebhookHeaders {
        let sig = signature::sign_hex(self.webhook_secret.as_bytes(), body).unwrap_or_default();
        WebhookHeaders::new().with(MOCK_SIGNATURE_HEADER, sig)
    }

    /// Builds a webhook body in the mock dialect.
    pub fn event_body(
        event_id: &str,
        event_type: &str,
        subscription_ref: &str,
        occurred_at: Timestamp,
    ) -> Vec<u8> {
        serde_json::json!({
            "id": event_id,
            "type": event_type,
            "subscription_ref": subscription_ref,
            "occurred_at": occurred_at.as_unix_secs(),
        })
        .to_string()
        .into_bytes()
    }

    async fn enter(&self, operation: &'static str, argument: String) -> Result<u64, GatewayError> {
        let delay = {
            let mut state = self.state();
            state.calls.push(MockCall {
                operation,
                argument,
            });
            state.sequence += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(err) = state.persistent.get(operation) {
            return Err(err.clone());
        }
        if let Some(err) = state.one_shot.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state.sequence)
    }
}

#[derive(Debug, Deserialize)]
struct MockEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subscription_ref: Option<String>,
    occurred_at: i64,
    #[serde(default)]
    period_end: Option<i64>,
    #[serde(default)]
    amount: Option<Money>,
}

#[async_trait]
impl ProviderGateway for MockGateway {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_subscription(
        &self,
        tier: &SubscriptionTier,
        customer: &CustomerRef,
        _trial_end: Option<Timestamp>,
    ) -> Result<ExternalRef, GatewayError> {
        let seq = self
            .enter("create_subscription", format!("{}:{}", customer.user_id, tier.id))
            .await?;
        Ok(ExternalRef {
            subscription_ref: format!("mock_sub_{}", seq),
            customer_ref: Some(format!("mock_cus_{}", customer.user_id)),
        })
    }

    async fn cancel_subscription(&self, external_ref: &str) -> Result<(), GatewayError> {
        self.enter("cancel_subscription", external_ref.to_string()).await?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        external_ref: &str,
        tier: &SubscriptionTier,
        credit: &Money,
    ) -> Result<(), GatewayError> {
        self.enter(
            "update_subscription",
            format!("{}:{}:{}", external_ref, tier.id, credit),
        )
        .await?;
        Ok(())
    }

    async fn charge(&self, external_ref: &str, amount: &Money) -> Result<ChargeReceipt, GatewayError> {
        let seq = self
            .enter("charge", format!("{}:{}", external_ref, amount))
            .await?;
        Ok(ChargeReceipt {
            payment_ref: format!("mock_ch_{}", seq),
        })
    }

    async fn refund(&self, payment_ref: &str, amount: &Money) -> Result<RefundReceipt, GatewayError> {
        let seq = self
            .enter("refund", format!("{}:{}", payment_ref, amount))
            .await?;
        Ok(RefundReceipt {
            refund_ref: format!("mock_re_{}", seq),
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], headers: &WebhookHeaders) -> bool {
        headers
            .get(MOCK_SIGNATURE_HEADER)
            .map(|sig| signature::verify_hex(self.webhook_secret.as_bytes(), raw_body, sig).is_ok())
            .unwrap_or(false)
    }

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, GatewayError> {
        let event: MockEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::permanent(format!("invalid mock event: {}", e)))?;
        let event_type = match event.event_type.as_str() {
            "payment_succeeded" => NormalizedEventType::PaymentSucceeded,
            "payment_failed" => NormalizedEventType::PaymentFailed,
            "subscription_canceled" => NormalizedEventType::SubscriptionCanceled,
            _ => NormalizedEventType::Ignored,
        };
        Ok(NormalizedEvent {
            provider_kind: self.kind,
            external_event_id: event.id,
            event_type,
            raw_type: event.event_type,
            external_subscription_ref: event.subscription_ref,
            amount: event.amount,
            period_end: event.period_end.and_then(Timestamp::from_unix_secs),
            provider_status: None,
            occurred_at: Timestamp::from_unix_secs(event.occurred_at)
                .ok_or_else(|| GatewayError::permanent("occurred_at out of range"))?,
        })
    }

    async fn test_connectivity(&self) -> ConnectivityReport {
        let unreachable = {
            let mut state = self.state();
            state.calls.push(MockCall {
                operation: "test_connectivity",
                argument: String::new(),
            });
            state.unreachable
        };
        if unreachable {
            ConnectivityReport::failed(0, "mock provider unreachable")
        } else {
            ConnectivityReport::ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_shot_failure_applies_once() {
        let mock = MockGateway::new(ProviderKind::CardNetwork);
        let usd = Money::new(100, crate::domain::foundation::Currency::usd());
        mock.fail_next("charge", GatewayError::transient("boom"));

        assert!(mock.charge("sub", &usd).await.is_err());
        assert!(mock.charge("sub", &usd).await.is_ok());
        assert_eq!(mock.call_count("charge"), 2);
    }

    #[tokio::test]
    async fn persistent_failure_until_cleared() {
        let mock = MockGateway::new(ProviderKind::Wallet);
        mock.fail_always("cancel_subscription", GatewayError::permanent("nope"));

        assert!(mock.cancel_subscription("a").await.is_err());
        assert!(mock.cancel_subscription("a").await.is_err());
        mock.clear_failures();
        assert!(mock.cancel_subscription("a").await.is_ok());
    }

    #[test]
    fn signed_body_verifies_and_parses() {
        let mock = MockGateway::new(ProviderKind::CardNetwork);
        let at = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        let body = MockGateway::event_body("evt_1", "payment_failed", "mock_sub_1", at);
        let headers = mock.sign(&body);

        assert!(mock.verify_webhook_signature(&body, &headers));
        let event = mock.parse_webhook_event(&body).unwrap();
        assert_eq!(event.event_type, NormalizedEventType::PaymentFailed);
        assert_eq!(event.occurred_at, at);

        let other = MockGateway::with_secret(ProviderKind::CardNetwork, "different");
        assert!(!other.verify_webhook_signature(&body, &headers));
    }

    #[tokio::test]
    async fn unreachable_probe_fails() {
        let mock = MockGateway::new(ProviderKind::CardNetwork);
        mock.set_unreachable(true);
        assert!(!mock.test_connectivity().await.success);
    }
}
