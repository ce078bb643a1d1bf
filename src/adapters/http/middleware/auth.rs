//! Authentication middleware and extractors for axum.
//!
//! - `admin_auth_middleware` - Requires an operator bearer token on every request
//! - `RequireAdmin` - Extractor for the authenticated operator
//! - `SubscriberIdentity` - Extractor for the end user on subscriber routes
//!
//! ```text
//! Request → admin_auth_middleware → injects AdminIdentity into extensions
//!                                          ↓
//!                                  Handler → RequireAdmin reads from extensions
//! ```
//!
//! Subscriber routes sit behind the user-facing API gateway, which
//! authenticates the end user and forwards the id in `X-User-Id`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::{ErrorCode, UserId};
use crate::ports::{AdminAuthError, AdminIdentity, AdminTokenValidator};

use super::super::error::ErrorResponse;

/// Header carrying the authenticated end user's id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Admin middleware state - wraps the token validator.
pub type AdminAuthState = Arc<dyn AdminTokenValidator>;

/// Rejects any request without a valid operator token.
///
/// Expects `Authorization: Bearer <token>`. Missing or invalid tokens get
/// 401; a valid token without the admin role gets 403.
pub async fn admin_auth_middleware(
    State(validator): State<AdminAuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token else {
        return AuthRejection::Unauthenticated.into_response();
    };

    match validator.validate(token).await {
        Ok(identity) => {
            tracing::debug!(subject = %identity.subject, "admin authenticated");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(AdminAuthError::Forbidden) => AuthRejection::Forbidden.into_response(),
        Err(AdminAuthError::Expired) => AuthRejection::Expired.into_response(),
        Err(AdminAuthError::InvalidToken(_)) => AuthRejection::Unauthenticated.into_response(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    Unauthenticated,
    Expired,
    Forbidden,
    MissingUser,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthRejection::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "Authentication is required")
            }
            AuthRejection::Expired => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, "Token expired"),
            AuthRejection::Forbidden => (StatusCode::FORBIDDEN, ErrorCode::Forbidden, "Admin role required"),
            AuthRejection::MissingUser => (
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Missing or invalid X-User-Id header",
            ),
        };
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

/// The operator behind an admin request. Its subject is the audit actor.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AdminIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminIdentity>()
            .cloned()
            .map(RequireAdmin)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// End user on subscriber routes.
#[derive(Debug, Clone)]
pub struct SubscriberIdentity(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for SubscriberIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .map(SubscriberIdentity)
            .ok_or(AuthRejection::MissingUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticAdminTokenValidator;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(RequireAdmin(admin): RequireAdmin) -> String {
        admin.subject
    }

    fn app() -> Router {
        let validator: AdminAuthState = Arc::new(
            StaticAdminTokenValidator::new("billing_admin")
                .with_identity("good", "ops@example.com", &["billing_admin"])
                .with_identity("viewer", "viewer@example.com", &[]),
        );
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(validator, admin_auth_middleware))
    }

    async fn status_with(auth: Option<&str>) -> StatusCode {
        let mut request = HttpRequest::builder().uri("/whoami");
        if let Some(auth) = auth {
            request = request.header("Authorization", auth);
        }
        app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn valid_admin_token_passes() {
        assert_eq!(status_with(Some("Bearer good")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_unknown_token_is_unauthorized() {
        assert_eq!(status_with(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with(Some("Bearer nope")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with(Some("Basic good")).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_without_role_is_forbidden() {
        assert_eq!(status_with(Some("Bearer viewer")).await, StatusCode::FORBIDDEN);
    }
}
