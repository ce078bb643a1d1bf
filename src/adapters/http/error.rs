//! API error type that converts billing errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{ErrorCode, ValidationError};

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl ToString, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self(BillingError::Validation(err))
    }
}

/// Status code for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed | ErrorCode::ConfigInvalid | ErrorCode::MalformedPayload => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::TierNotFound
        | ErrorCode::SubscriptionNotFound
        | ErrorCode::ProviderNotFound
        | ErrorCode::PaymentNotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidStateTransition
        | ErrorCode::ActiveSubscriptionExists
        | ErrorCode::ConcurrentModification
        | ErrorCode::DuplicateEvent => StatusCode::CONFLICT,
        ErrorCode::SignatureInvalid | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::ProviderPermanentError => StatusCode::PAYMENT_REQUIRED,
        ErrorCode::ProviderTransientError | ErrorCode::ProviderUnavailable | ErrorCode::AuditUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorCode::StorageError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        let message = match &self.0 {
            // Storage details stay in the logs
            BillingError::Storage(_) => "internal storage failure".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, code = %code, "request failed");
        } else {
            tracing::debug!(error = %self.0, code = %code, "request rejected");
        }
        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ProviderId, SubscriptionId};

    fn status_of(err: BillingError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn not_found_errors_map_to_404() {
        assert_eq!(status_of(BillingError::SubscriptionNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BillingError::ProviderNotFound(ProviderId::new())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_errors_map_by_classification() {
        let declined = BillingError::ProviderPermanent {
            provider: ProviderId::new(),
            code: Some("card_declined".into()),
            message: "declined".into(),
        };
        assert_eq!(status_of(declined), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status_of(BillingError::unavailable("none")), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn conflicts_map_to_409() {
        assert_eq!(
            status_of(BillingError::ConcurrentModification(SubscriptionId::new())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn validation_maps_to_400() {
        let err: ApiError = ValidationError::empty_field("name").into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
