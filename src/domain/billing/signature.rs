//! HMAC-SHA256 webhook signature checks.
//!
//! Two header dialects are supported:
//! - timestamped: `t=<unix>,v1=<hex>` signing `"{t}.{body}"` (card networks)
//! - plain hex over a provider-defined message (wallet providers)
//!
//! All comparisons are constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Allowed clock skew for signatures stamped in the future.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature header missing")]
    MissingHeader,

    #[error("signature header malformed: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    Mismatch,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfRange,

    #[error("signature timestamp in the future")]
    TimestampInFuture,

    #[error("signing secret unusable")]
    InvalidKey,
}

/// Parsed `t=..,v1=..` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// All `v1` signatures present (several during secret rotation).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| SignatureError::Malformed("expected key=value".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| SignatureError::Malformed("invalid timestamp".to_string()))?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex::decode(value)
                            .map_err(|_| SignatureError::Malformed("invalid v1 hex".to_string()))?,
                    );
                }
                // Unknown schemes are ignored for forward compatibility
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn hmac_sha256(secret: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Checks that `timestamp` is within `tolerance_secs` of `now`.
pub fn check_timestamp(timestamp: i64, now: i64, tolerance_secs: i64) -> Result<(), SignatureError> {
    let age = now - timestamp;
    if age > tolerance_secs {
        return Err(SignatureError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::TimestampInFuture);
    }
    Ok(())
}

/// Verifies a timestamped `t=..,v1=..` header against `payload`.
pub fn verify_timestamped(
    secret: &[u8],
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let header = SignatureHeader::parse(header)?;
    check_timestamp(header.timestamp, now, tolerance_secs)?;

    let timestamp = header.timestamp.to_string();
    let expected = hmac_sha256(secret, &[timestamp.as_bytes(), b".", payload])?;

    if header
        .v1_signatures
        .iter()
        .any(|candidate| constant_time_eq(&expected, candidate))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Verifies a bare hex HMAC over `message`.
pub fn verify_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
    let provided = hex::decode(signature_hex.trim())
        .map_err(|_| SignatureError::Malformed("invalid signature hex".to_string()))?;
    let expected = hmac_sha256(secret, &[message])?;
    if constant_time_eq(&expected, &provided) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Produces a `t=..,v1=..` header. Used by the mock gateway and tests.
pub fn sign_timestamped(secret: &[u8], timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let ts = timestamp.to_string();
    let mac = hmac_sha256(secret, &[ts.as_bytes(), b".", payload])?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(mac)))
}

/// Produces a bare hex HMAC over `message`.
pub fn sign_hex(secret: &[u8], message: &[u8]) -> Result<String, SignatureError> {
    Ok(hex::encode(hmac_sha256(secret, &[message])?))
}
