//! Shared HTTP plumbing for the REST gateways.
//!
//! Maps transport failures and provider status codes onto the gateway error
//! classification so every adapter reports failures the same way.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::ports::GatewayError;

/// Builds the per-provider client; the timeout is the provider's configured one.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::config(format!("http client: {}", e)))
}

/// Classifies a transport-level failure. Everything short of a response is transient.
pub(crate) fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        GatewayError::transient(format!("connection failed: {}", err))
    } else if err.is_builder() {
        GatewayError::config(format!("request could not be built: {}", err))
    } else {
        GatewayError::transient(err.to_string())
    }
}

/// Provider error envelopes differ; both shapes seen in practice are accepted.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Reads a JSON body, turning non-2xx answers into classified errors.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), operation, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::transient(format!("{}: unreadable response: {}", operation, e)))
}

/// Like [`read_json`] for endpoints whose body is irrelevant.
pub(crate) async fn expect_success(
    response: reqwest::Response,
    operation: &str,
) -> Result<(), GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), operation, &body))
}

pub(crate) fn status_error(status: u16, operation: &str, body: &str) -> GatewayError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let (code, message) = match envelope {
        Some(ErrorEnvelope {
            error: Some(inner), ..
        }) => (inner.decline_code.or(inner.code), inner.message),
        Some(ErrorEnvelope { name, message, .. }) => (name, message),
        None => (None, None),
    };
    let message = format!(
        "{} failed with HTTP {}: {}",
        operation,
        status,
        message.unwrap_or_else(|| truncate(body, 200))
    );
    let err = GatewayError::from_status(status, message);
    match code {
        Some(code) => err.with_provider_code(code),
        None => err,
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::GatewayErrorKind;

    #[test]
    fn card_style_error_envelope_yields_decline_code() {
        let body = r#"{"error":{"code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#;
        let err = status_error(402, "charge", body);
        assert_eq!(err.kind, GatewayErrorKind::Permanent);
        assert_eq!(err.provider_code.as_deref(), Some("insufficient_funds"));
        assert!(err.message.contains("insufficient funds"));
    }

    #[test]
    fn wallet_style_error_envelope_yields_name() {
        let body = r#"{"name":"INSTRUMENT_DECLINED","message":"declined"}"#;
        let err = status_error(422, "capture", body);
        assert_eq!(err.provider_code.as_deref(), Some("INSTRUMENT_DECLINED"));
    }

    #[test]
    fn unparseable_body_is_kept_truncated() {
        let body = "x".repeat(500);
        let err = status_error(503, "charge", &body);
        assert!(err.is_transient());
        assert!(err.message.len() < 300);
        assert!(err.provider_code.is_none());
    }
}
