//! Axum router for operator endpoints.

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use super::super::state::AppState;
use super::handlers::{
    billing_analytics, cancel_subscription, create_provider, create_tier, deactivate_tier, get_policy,
    get_subscription, list_providers, list_tiers, provider_health, provider_history, reactivate_subscription,
    recent_audit, refund_payment, remove_provider, reprocess_webhooks, test_provider, update_policy,
    update_provider, update_tier,
};

/// Operator routes, mounted at `/admin` behind admin authentication.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/providers", get(list_providers).post(create_provider))
        .route("/providers/:id", put(update_provider).delete(remove_provider))
        .route("/providers/:id/history", get(provider_history))
        .route("/providers/:id/test", post(test_provider))
        .route("/health", get(provider_health))
        .route("/policy", get(get_policy).put(update_policy))
        .route("/tiers", get(list_tiers).post(create_tier))
        .route("/tiers/:id", patch(update_tier))
        .route("/tiers/:id/deactivate", post(deactivate_tier))
        .route("/subscriptions/analytics", get(billing_analytics))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id/reactivate", post(reactivate_subscription))
        .route("/payments/:id/refund", post(refund_payment))
        .route("/webhooks/reprocess", post(reprocess_webhooks))
        .route("/audit", get(recent_audit))
}
