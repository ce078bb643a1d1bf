//! HTTP handlers for subscriber endpoints.
//!
//! Every route acts on the caller's own subscriptions; a subscription of
//! another user answers 404.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::{
    CancelSubscriptionCommand, ChangeTierCommand, CreateSubscriptionCommand, GetSubscriptionQuery,
    ListTiersQuery, ReactivateSubscriptionCommand,
};
use crate::application::handlers::subscription::GetSubscriptionResult;
use crate::domain::foundation::SubscriptionId;

use super::super::error::ApiError;
use super::super::middleware::SubscriberIdentity;
use super::super::state::AppState;
use super::dto::{
    ChangeTierRequest, ChangeTierResponse, CreateSubscriptionRequest, ReactivateResponse,
    SubscriptionDetailResponse, SubscriptionView,
};

impl From<GetSubscriptionResult> for SubscriptionDetailResponse {
    fn from(result: GetSubscriptionResult) -> Self {
        Self {
            subscription: result.subscription.into(),
            tier: result.tier,
            payments: result.payments,
        }
    }
}

/// GET /api/tiers - Tiers currently offered
pub async fn list_offered_tiers(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tiers = state
        .list_tiers_handler()
        .handle(ListTiersQuery { include_inactive: false })
        .await?;
    Ok(Json(tiers))
}

/// POST /api/subscriptions - Subscribe the caller to a tier
pub async fn create_subscription(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = CreateSubscriptionCommand {
        user_id,
        email: request.email,
        tier_id: request.tier_id,
        payment_method: request.payment_method,
        payment_token: request.payment_token,
    };

    let result = state.create_subscription_handler().handle(cmd).await?;

    Ok((StatusCode::CREATED, Json(SubscriptionView::from(result.subscription))))
}

/// GET /api/subscriptions/current - The caller's live subscription
pub async fn get_current_subscription(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery::LiveForUser(user_id))
        .await?;
    Ok(Json(SubscriptionDetailResponse::from(result)))
}

/// GET /api/subscriptions/:id
pub async fn get_subscription(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery::ById {
            subscription_id,
            requested_by: Some(user_id),
        })
        .await?;
    Ok(Json(SubscriptionDetailResponse::from(result)))
}

/// POST /api/subscriptions/:id/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .cancel_subscription_handler()
        .handle(CancelSubscriptionCommand {
            subscription_id,
            requested_by: Some(user_id),
        })
        .await?;
    Ok(Json(SubscriptionView::from(result.subscription)))
}

/// POST /api/subscriptions/:id/tier
pub async fn change_tier(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
    Path(subscription_id): Path<SubscriptionId>,
    Json(request): Json<ChangeTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .change_tier_handler()
        .handle(ChangeTierCommand {
            subscription_id,
            new_tier_id: request.tier_id,
            requested_by: Some(user_id),
        })
        .await?;
    Ok(Json(ChangeTierResponse {
        subscription: result.subscription.into(),
        credit: result.credit,
    }))
}

/// POST /api/subscriptions/:id/reactivate
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    SubscriberIdentity(user_id): SubscriberIdentity,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .reactivate_handler()
        .handle(ReactivateSubscriptionCommand {
            subscription_id,
            requested_by: Some(user_id),
        })
        .await?;
    Ok(Json(ReactivateResponse {
        subscription: result.subscription.into(),
        payment: result.payment,
    }))
}
