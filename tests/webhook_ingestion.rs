//! Provider webhook ingestion over HTTP.
//!
//! Verifies signature checks, exactly-once application, ordering by provider
//! timestamp, and deferred application of events that arrive early.

mod common;

use axum::http::{Method, StatusCode};

use common::Harness;
use subscription_billing::adapters::gateways::MockGateway;
use subscription_billing::domain::billing::ProviderKind;
use subscription_billing::ports::{OperatorAlert, WebhookHeaders};

async fn active_subscription(h: &Harness) -> MockGateway {
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    let sub = h.subscribe("alice", &tier).await;
    assert_eq!(sub["status"], "active");
    gateway
}

async fn status_of(h: &Harness, user: &str) -> String {
    h.current(user).await.body["subscription"]["status"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn signed_event_is_applied_once() {
    let h = Harness::without_trial().await;
    let gateway = active_subscription(&h).await;

    let first = h.webhook(&gateway, "evt_1", "payment_failed", "mock_sub_1").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["outcome"], "applied");
    assert_eq!(first.body["event_id"], "evt_1");
    assert_eq!(status_of(&h, "alice").await, "past_due");

    let redelivered = h.webhook(&gateway, "evt_1", "payment_failed", "mock_sub_1").await;
    assert_eq!(redelivered.status, StatusCode::OK);
    assert_eq!(redelivered.body["outcome"], "duplicate_ignored");
    assert_eq!(status_of(&h, "alice").await, "past_due");
}

#[tokio::test]
async fn bad_signature_is_rejected_without_state_change() {
    let h = Harness::without_trial().await;
    active_subscription(&h).await;
    let forger = MockGateway::with_secret(ProviderKind::CardNetwork, "not-the-secret");

    let response = h.webhook(&forger, "evt_1", "subscription_canceled", "mock_sub_1").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["outcome"], "rejected");
    assert_eq!(status_of(&h, "alice").await, "active");
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let h = Harness::without_trial().await;
    active_subscription(&h).await;
    let body = MockGateway::event_body("evt_1", "payment_failed", "mock_sub_1", h.clock_now());

    let response = h.deliver(&WebhookHeaders::new(), body).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(status_of(&h, "alice").await, "active");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let h = Harness::without_trial().await;
    let gateway = active_subscription(&h).await;
    let body = b"{not json".to_vec();

    let response = h.deliver(&gateway.sign(&body), body).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["outcome"], "rejected");
    assert!(response.body["event_id"]
        .as_str()
        .unwrap_or_default()
        .starts_with("digest:"));
}

#[tokio::test]
async fn unknown_and_unconfigured_kinds_are_not_found() {
    let h = Harness::without_trial().await;
    active_subscription(&h).await;

    let unknown = h.send(Method::POST, "/webhooks/carrier-pigeon", &[], Some(b"{}".to_vec())).await;
    let unconfigured = h.send(Method::POST, "/webhooks/wallet", &[], Some(b"{}".to_vec())).await;

    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unconfigured.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn older_event_arriving_late_does_not_undo_newer_state() {
    let h = Harness::without_trial().await;
    let gateway = active_subscription(&h).await;
    let earlier = h.clock_now();
    h.advance_days(1);

    let newer = h.webhook(&gateway, "evt_newer", "payment_failed", "mock_sub_1").await;
    assert_eq!(newer.status, StatusCode::OK);

    let body = MockGateway::event_body("evt_older", "payment_succeeded", "mock_sub_1", earlier);
    let stale = h.deliver(&gateway.sign(&body), body).await;

    assert_eq!(stale.status, StatusCode::OK);
    assert_eq!(status_of(&h, "alice").await, "past_due");
}

#[tokio::test]
async fn provider_cancellation_ends_the_subscription() {
    let h = Harness::without_trial().await;
    let gateway = active_subscription(&h).await;

    let response = h.webhook(&gateway, "evt_cancel", "subscription_canceled", "mock_sub_1").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(h.current("alice").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn early_event_is_applied_by_the_scheduler_once_the_subscription_exists() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;

    // The provider reports on a subscription the engine has not stored yet.
    let early = h.webhook(&gateway, "evt_early", "payment_failed", "mock_sub_1").await;
    assert_eq!(early.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(early.body["outcome"], "failed_retryable");

    h.subscribe("alice", &tier).await;
    let report = h.scheduler.tick_once().await.unwrap();

    assert_eq!(report.webhooks.applied, 1);
    assert_eq!(status_of(&h, "alice").await, "past_due");
}

#[tokio::test]
async fn repeated_failures_become_terminal_and_alert_operators() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;

    for _ in 0..2 {
        let retry = h.webhook(&gateway, "evt_orphan", "payment_failed", "mock_sub_nobody").await;
        assert_eq!(retry.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    let last = h.webhook(&gateway, "evt_orphan", "payment_failed", "mock_sub_nobody").await;
    assert_eq!(last.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(last.body["outcome"], "failed");
    assert!(h
        .notifier
        .alerts()
        .iter()
        .any(|a| matches!(a, OperatorAlert::WebhookFailed { .. })));

    let after = h.webhook(&gateway, "evt_orphan", "payment_failed", "mock_sub_nobody").await;
    assert_eq!(after.status, StatusCode::OK);
    assert_eq!(after.body["outcome"], "duplicate_ignored");
}
