//! End-to-end subscription lifecycle through the HTTP API and scheduler.
//!
//! Covers trial conversion, dunning, suspension, reactivation, tier
//! changes and cancellation with mock gateways and a manual clock.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::Harness;
use subscription_billing::domain::billing::ProviderKind;
use subscription_billing::ports::GatewayError;

// =============================================================================
// Trials
// =============================================================================

#[tokio::test]
async fn trial_converts_to_active_with_a_recorded_charge() {
    let h = Harness::new().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;

    let sub = h.subscribe("alice", &tier).await;
    assert_eq!(sub["status"], "trialing");

    // Nothing is due yet.
    let report = h.scheduler.tick_once().await.unwrap();
    assert_eq!(report.trials_converted, 0);

    h.advance_days(14);
    let report = h.scheduler.tick_once().await.unwrap();
    assert_eq!(report.trials_converted, 1);
    assert_eq!(gateway.call_count("charge"), 1);

    let current = h.current("alice").await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["subscription"]["status"], "active");
    assert_eq!(current.body["payments"].as_array().unwrap().len(), 1);
    assert_eq!(current.body["payments"][0]["outcome"], "succeeded");
}

#[tokio::test]
async fn declined_trial_charge_expires_the_subscription() {
    let h = Harness::new().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    h.subscribe("alice", &tier).await;
    gateway.fail_always("charge", GatewayError::permanent("card declined"));

    h.advance_days(14);
    let report = h.scheduler.tick_once().await.unwrap();

    assert_eq!(report.trials_expired, 1);
    // Expired is terminal, so nothing is live any more.
    assert_eq!(h.current("alice").await.status, StatusCode::NOT_FOUND);

    // The user may start over.
    gateway.clear_failures();
    h.subscribe("alice", &tier).await;
}

// =============================================================================
// Dunning
// =============================================================================

#[tokio::test]
async fn failed_payment_webhook_then_successful_retry_recovers() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    let sub = h.subscribe("alice", &tier).await;
    assert_eq!(sub["status"], "active");

    let delivered = h.webhook(&gateway, "evt_fail_1", "payment_failed", "mock_sub_1").await;
    assert_eq!(delivered.status, StatusCode::OK);
    let current = h.current("alice").await;
    assert_eq!(current.body["subscription"]["status"], "past_due");
    assert!(current.body["subscription"]["grace_period_end"].is_string());

    h.advance_days(1);
    let report = h.scheduler.tick_once().await.unwrap();

    assert_eq!(report.retries_succeeded, 1);
    let current = h.current("alice").await;
    assert_eq!(current.body["subscription"]["status"], "active");
    assert_eq!(current.body["subscription"]["retry_count"], 0);
    assert!(current.body["subscription"]["grace_period_end"].is_null());
}

#[tokio::test]
async fn exhausted_retries_suspend_and_manual_reactivation_restores() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    let sub = h.subscribe("alice", &tier).await;
    let id = sub["id"].as_str().unwrap().to_string();

    h.webhook(&gateway, "evt_fail_1", "payment_failed", "mock_sub_1").await;
    gateway.fail_always("charge", GatewayError::permanent("insufficient funds"));

    h.advance_days(1);
    let first = h.scheduler.tick_once().await.unwrap();
    assert_eq!(first.retries_failed, 1);
    assert_eq!(h.current("alice").await.body["subscription"]["status"], "past_due");

    h.advance_days(1);
    let second = h.scheduler.tick_once().await.unwrap();
    assert_eq!(second.suspended, 1);
    assert_eq!(h.current("alice").await.body["subscription"]["status"], "suspended");

    // Reactivation charges again; a decline keeps it suspended.
    let declined = h
        .user("alice", Method::POST, &format!("/api/subscriptions/{}/reactivate", id), None)
        .await;
    assert_eq!(declined.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(h.current("alice").await.body["subscription"]["status"], "suspended");

    gateway.clear_failures();
    let reactivated = h
        .user("alice", Method::POST, &format!("/api/subscriptions/{}/reactivate", id), None)
        .await;
    assert_eq!(reactivated.status, StatusCode::OK, "{}", reactivated.body);
    assert_eq!(reactivated.body["subscription"]["status"], "active");
    assert_eq!(reactivated.body["payment"]["reason"], "reactivation");
}

#[tokio::test]
async fn grace_expiry_suspends_even_with_retries_left() {
    let h = Harness::without_trial().await;
    h.set_policy(json!({
        "default_currency": "USD",
        "grace_period_days": 2,
        "trial_enabled": false,
        "default_trial_days": 0,
        "max_payment_retries": 5,
        "retry_interval_days": 3
    }))
    .await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    h.subscribe("alice", &tier).await;
    h.webhook(&gateway, "evt_fail_1", "payment_failed", "mock_sub_1").await;

    h.advance_days(2);
    let report = h.scheduler.tick_once().await.unwrap();

    assert_eq!(report.suspended, 1);
    assert_eq!(gateway.call_count("charge"), 0);
    assert_eq!(h.current("alice").await.body["subscription"]["status"], "suspended");
}

// =============================================================================
// Tier changes and cancellation
// =============================================================================

#[tokio::test]
async fn tier_change_mid_period_reports_credit() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let pro = h.add_tier("Pro", 3000).await;
    let team = h.add_tier("Team", 9000).await;
    let sub = h.subscribe("alice", &pro).await;
    let id = sub["id"].as_str().unwrap();

    h.advance_days(15);
    let changed = h
        .user("alice", Method::POST, &format!("/api/subscriptions/{}/tier", id), Some(json!({"tier_id": team})))
        .await;

    assert_eq!(changed.status, StatusCode::OK, "{}", changed.body);
    assert_eq!(changed.body["subscription"]["tier_id"], team.as_str());
    assert!(changed.body["credit"]["amount_minor"].as_i64().unwrap() > 0);
    assert_eq!(gateway.call_count("update_subscription"), 1);
}

#[tokio::test]
async fn cancel_reaches_provider_and_is_final() {
    let h = Harness::without_trial().await;
    let (_, gateway) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    let sub = h.subscribe("alice", &tier).await;
    let uri = format!("/api/subscriptions/{}/cancel", sub["id"].as_str().unwrap());

    let canceled = h.user("alice", Method::POST, &uri, None).await;
    assert_eq!(canceled.status, StatusCode::OK);
    assert_eq!(canceled.body["status"], "canceled");
    assert_eq!(gateway.call_count("cancel_subscription"), 1);

    let again = h.user("alice", Method::POST, &uri, None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(gateway.call_count("cancel_subscription"), 1);
}

#[tokio::test]
async fn another_users_subscription_is_invisible() {
    let h = Harness::without_trial().await;
    h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    let sub = h.subscribe("alice", &tier).await;
    let id = sub["id"].as_str().unwrap();

    let peek = h.user("mallory", Method::GET, &format!("/api/subscriptions/{}", id), None).await;
    let cancel = h
        .user("mallory", Method::POST, &format!("/api/subscriptions/{}/cancel", id), None)
        .await;

    assert_eq!(peek.status, StatusCode::NOT_FOUND);
    assert_eq!(cancel.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn second_live_subscription_conflicts() {
    let h = Harness::without_trial().await;
    h.add_provider(ProviderKind::CardNetwork, 1).await;
    let tier = h.add_tier("Pro", 3000).await;
    h.subscribe("alice", &tier).await;

    let second = h
        .user("alice", Method::POST, "/api/subscriptions", Some(json!({"tier_id": tier})))
        .await;

    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.body["code"].is_string());
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let h = Harness::without_trial().await;

    let response = h.send(Method::GET, "/api/subscriptions/current", &[], None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failover_to_second_provider_when_first_is_down() {
    let h = Harness::without_trial().await;
    let (_, primary) = h.add_provider(ProviderKind::CardNetwork, 1).await;
    let (backup_id, backup) = h.add_provider(ProviderKind::Wallet, 2).await;
    primary.fail_always("create_subscription", GatewayError::transient("503 from upstream"));
    let tier = h.add_tier("Pro", 3000).await;

    let sub = h.subscribe("alice", &tier).await;

    assert_eq!(sub["provider_id"], backup_id.to_string());
    assert_eq!(sub["provider_kind"], "wallet");
    assert_eq!(backup.call_count("create_subscription"), 1);
}
