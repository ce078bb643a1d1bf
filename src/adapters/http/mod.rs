//! HTTP adapters - REST API implementations.
//!
//! Three surfaces share one [`AppState`]:
//! - `/webhooks/{kind}` - provider callbacks, authenticated by signature
//! - `/api` - subscriber endpoints, caller identified by the gateway
//! - `/admin` - operator endpoints behind bearer-token auth

pub mod admin;
pub mod error;
pub mod middleware;
pub mod state;
pub mod subscriber;
pub mod webhooks;

use std::time::Duration;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use self::middleware::admin_auth_middleware;

/// Builds the complete service router.
pub fn api_router(state: AppState, request_timeout: Duration) -> Router {
    let admin = admin::admin_routes().route_layer(from_fn_with_state(
        state.admin_validator.clone(),
        admin_auth_middleware,
    ));

    Router::new()
        .route("/health/live", get(liveness))
        .nest("/webhooks", webhooks::webhook_routes())
        .nest("/api", subscriber::subscriber_routes())
        .nest("/admin", admin)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "ok"
}
