//! HTTP handlers for operator endpoints.
//!
//! Every handler takes the verified admin identity; its subject is the
//! actor recorded in the audit log.

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::handlers::{
    CancelSubscriptionCommand, CreateTierCommand, DeactivateTierCommand, GetBillingAnalyticsQuery,
    GetSubscriptionQuery, ListTiersQuery, ReactivateSubscriptionCommand, RefundPaymentCommand,
    UpdateTierCommand,
};
use crate::application::{ProviderRemoval, ProviderSummary};
use crate::domain::billing::{BillingError, GlobalBillingPolicy};
use crate::domain::foundation::{PaymentAttemptId, ProviderId, SubscriptionId, TierId};

use super::super::error::ApiError;
use super::super::middleware::RequireAdmin;
use super::super::state::AppState;
use super::super::subscriber::dto::{ReactivateResponse, SubscriptionDetailResponse, SubscriptionView};
use super::dto::{
    AuditParams, CreateTierRequest, ListTiersParams, PolicyRequest, ProviderListResponse,
    ProviderRemovalResponse, ProviderRequest, ProviderStatusView, RefundRequest, UpdateTierRequest,
    UpdateTierResponse,
};

const MAX_AUDIT_PAGE: usize = 500;
const REPROCESS_BATCH: usize = 100;

// ════════════════════════════════════════════════════════════════════════════════
// Providers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /admin/providers - Every configured provider with its health
pub async fn list_providers(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.store.snapshot();
    let health = state.router.health();
    let providers = snapshot
        .providers
        .iter()
        .map(|p| ProviderStatusView {
            provider: ProviderSummary::from(p),
            health: health.get(p.id),
        })
        .collect();

    Ok(Json(ProviderListResponse {
        config_version: snapshot.version,
        providers,
    }))
}

/// POST /admin/providers - Register a provider
pub async fn create_provider(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<ProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .store
        .upsert_provider(&admin.subject, request.into_draft(None))
        .await?;
    Ok((StatusCode::CREATED, Json(ProviderSummary::from(&saved))))
}

/// PUT /admin/providers/:id - Replace a provider's configuration
pub async fn update_provider(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(provider_id): Path<ProviderId>,
    Json(request): Json<ProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = state
        .store
        .upsert_provider(&admin.subject, request.into_draft(Some(provider_id)))
        .await?;
    Ok(Json(ProviderSummary::from(&saved)))
}

/// DELETE /admin/providers/:id
///
/// A provider still referenced by subscriptions is disabled rather than
/// removed.
pub async fn remove_provider(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(provider_id): Path<ProviderId>,
) -> Result<impl IntoResponse, ApiError> {
    let response = match state.store.remove_provider(&admin.subject, provider_id).await? {
        ProviderRemoval::Removed => ProviderRemovalResponse {
            result: "removed",
            provider: None,
        },
        ProviderRemoval::Deactivated(provider) => ProviderRemovalResponse {
            result: "deactivated",
            provider: Some(ProviderSummary::from(&provider)),
        },
    };
    Ok(Json(response))
}

/// GET /admin/providers/:id/history - Every saved version, oldest first
pub async fn provider_history(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(provider_id): Path<ProviderId>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.store.provider_history(provider_id).await?;
    if history.is_empty() {
        return Err(BillingError::ProviderNotFound(provider_id).into());
    }
    let versions: Vec<ProviderSummary> = history.iter().map(ProviderSummary::from).collect();
    Ok(Json(versions))
}

/// POST /admin/providers/:id/test - Run a connectivity check now
///
/// The result also feeds the provider's routing health.
pub async fn test_provider(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(provider_id): Path<ProviderId>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.store.test_connectivity(provider_id).await?;
    state.router.health().record_probe(provider_id, &report, state.clock.now());
    Ok(Json(report))
}

/// GET /admin/health - Routing health of every configured provider
pub async fn provider_health(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let health = state.router.health();
    let providers: Vec<ProviderStatusView> = state
        .store
        .snapshot()
        .providers
        .iter()
        .map(|p| ProviderStatusView {
            provider: ProviderSummary::from(p),
            health: health.get(p.id),
        })
        .collect();
    Ok(Json(providers))
}

// ════════════════════════════════════════════════════════════════════════════════
// Policy
// ════════════════════════════════════════════════════════════════════════════════

/// GET /admin/policy
pub async fn get_policy(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_policy()))
}

/// PUT /admin/policy - Replace the global billing policy
pub async fn update_policy(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<PolicyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let policy = state
        .store
        .update_policy(&admin.subject, GlobalBillingPolicy::from(request))
        .await?;
    Ok(Json(policy))
}

// ════════════════════════════════════════════════════════════════════════════════
// Tiers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /admin/tiers - The catalog, retired tiers included on request
pub async fn list_tiers(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListTiersParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tiers = state
        .list_tiers_handler()
        .handle(ListTiersQuery {
            include_inactive: params.include_inactive,
        })
        .await?;
    Ok(Json(tiers))
}

/// POST /admin/tiers
pub async fn create_tier(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreateTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = state
        .create_tier_handler()
        .handle(CreateTierCommand {
            actor: admin.subject,
            name: request.name,
            description: request.description,
            price: request.price,
            period: request.period,
            features: request.features,
            is_default: request.is_default,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

/// PATCH /admin/tiers/:id
pub async fn update_tier(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(tier_id): Path<TierId>,
    Json(request): Json<UpdateTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .update_tier_handler()
        .handle(UpdateTierCommand {
            actor: admin.subject,
            tier_id,
            name: request.name,
            description: request.description,
            features: request.features,
            is_default: request.is_default,
            price: request.price,
        })
        .await?;
    Ok(Json(UpdateTierResponse {
        tier: result.tier,
        retired: result.retired,
    }))
}

/// POST /admin/tiers/:id/deactivate - Stop offering a tier
pub async fn deactivate_tier(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(tier_id): Path<TierId>,
) -> Result<impl IntoResponse, ApiError> {
    let tier = state
        .deactivate_tier_handler()
        .handle(DeactivateTierCommand {
            actor: admin.subject,
            tier_id,
        })
        .await?;
    Ok(Json(tier))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions and payments
// ════════════════════════════════════════════════════════════════════════════════

/// GET /admin/subscriptions/analytics
pub async fn billing_analytics(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let analytics = state.analytics_handler().handle(GetBillingAnalyticsQuery).await?;
    Ok(Json(analytics))
}

/// GET /admin/subscriptions/:id
pub async fn get_subscription(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .get_subscription_handler()
        .handle(GetSubscriptionQuery::ById {
            subscription_id,
            requested_by: None,
        })
        .await?;
    Ok(Json(SubscriptionDetailResponse::from(result)))
}

/// POST /admin/subscriptions/:id/cancel - Cancel on behalf of the customer
pub async fn cancel_subscription(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .cancel_subscription_handler()
        .handle(CancelSubscriptionCommand {
            subscription_id,
            requested_by: None,
        })
        .await?;
    tracing::info!(subscription_id = %subscription_id, actor = %admin.subject, "operator canceled subscription");
    Ok(Json(SubscriptionView::from(result.subscription)))
}

/// POST /admin/subscriptions/:id/reactivate
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .reactivate_handler()
        .handle(ReactivateSubscriptionCommand {
            subscription_id,
            requested_by: None,
        })
        .await?;
    tracing::info!(subscription_id = %subscription_id, actor = %admin.subject, "operator reactivated subscription");
    Ok(Json(ReactivateResponse {
        subscription: result.subscription.into(),
        payment: result.payment,
    }))
}

/// POST /admin/payments/:id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(payment_id): Path<PaymentAttemptId>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .refund_handler()
        .handle(RefundPaymentCommand {
            payment_id,
            amount: request.amount,
            actor: admin.subject,
        })
        .await?;
    Ok(Json(result))
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhooks and audit
// ════════════════════════════════════════════════════════════════════════════════

/// POST /admin/webhooks/reprocess - Retry stored webhooks now
pub async fn reprocess_webhooks(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.ingestor.reprocess_retryable(REPROCESS_BATCH).await?;
    tracing::info!(actor = %admin.subject, applied = report.applied, "webhook reprocess requested");
    Ok(Json(report))
}

/// GET /admin/audit?limit=N - Most recent administrative actions
pub async fn recent_audit(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<AuditParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.audit.recent(params.limit.min(MAX_AUDIT_PAGE)).await?;
    Ok(Json(entries))
}
