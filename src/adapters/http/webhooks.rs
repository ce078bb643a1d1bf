//! Provider webhook endpoint.
//!
//! `POST /webhooks/{kind}` takes the provider's native payload. No bearer
//! auth: the signature header is verified against the stored secret. The
//! status code drives the provider's redelivery: 2xx stops it, 4xx means
//! the delivery itself is bad, 5xx asks for another try.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::domain::billing::ProviderKind;
use crate::domain::foundation::ErrorCode;
use crate::ports::WebhookHeaders;

use super::error::ErrorResponse;
use super::state::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/:kind", post(receive_webhook))
}

/// POST /webhooks/:kind
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kind: ProviderKind = match kind.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(ErrorCode::ProviderNotFound, format!("unknown provider kind '{}'", kind))),
            )
                .into_response()
        }
    };

    let response = state.ingestor.ingest(kind, &body, &to_webhook_headers(&headers)).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}

fn to_webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    let mut out = WebhookHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}
