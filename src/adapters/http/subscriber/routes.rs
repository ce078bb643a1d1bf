//! Axum router for subscriber endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::super::state::AppState;
use super::handlers::{
    cancel_subscription, change_tier, create_subscription, get_current_subscription, get_subscription,
    list_offered_tiers, reactivate_subscription,
};

/// Subscriber routes, mounted at `/api`.
///
/// - `GET /tiers` - Offered tiers
/// - `POST /subscriptions` - Subscribe
/// - `GET /subscriptions/current` - Caller's live subscription
/// - `GET /subscriptions/:id` - One of the caller's subscriptions
/// - `POST /subscriptions/:id/cancel` - Cancel
/// - `POST /subscriptions/:id/tier` - Change tier
/// - `POST /subscriptions/:id/reactivate` - Reactivate after suspension
pub fn subscriber_routes() -> Router<AppState> {
    Router::new()
        .route("/tiers", get(list_offered_tiers))
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/current", get(get_current_subscription))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id/tier", post(change_tier))
        .route("/subscriptions/:id/reactivate", post(reactivate_subscription))
}
