//! Durable webhook event records.
//!
//! The (provider kind, external event id) pair is the idempotency key. A
//! record is written as `Received` before any processing and then walks the
//! per-event state machine below.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::foundation::{StateMachine, SubscriptionId, Timestamp};

use super::{BillingError, NormalizedEvent, ProviderKind};

/// Key prefix of records for bodies that could not be parsed.
pub const UNPARSEABLE_KEY_PREFIX: &str = "digest:";

/// Processing status of a stored webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Received,
    Verifying,
    Verified,
    Applying,
    Applied,
    /// Bad signature or replayed delivery.
    Rejected,
    /// Will be retried by re-delivery or the scheduler.
    FailedRetryable,
    /// Gave up; operators were alerted.
    Failed,
}

impl WebhookEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventStatus::Received => "received",
            WebhookEventStatus::Verifying => "verifying",
            WebhookEventStatus::Verified => "verified",
            WebhookEventStatus::Applying => "applying",
            WebhookEventStatus::Applied => "applied",
            WebhookEventStatus::Rejected => "rejected",
            WebhookEventStatus::FailedRetryable => "failed_retryable",
            WebhookEventStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        use WebhookEventStatus::*;
        [Received, Verifying, Verified, Applying, Applied, Rejected, FailedRetryable, Failed]
            .into_iter()
            .find(|status| status.as_str() == s)
    }

    /// Final statuses are eligible for retention cleanup.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            WebhookEventStatus::Applied | WebhookEventStatus::Rejected | WebhookEventStatus::Failed
        )
    }
}

impl StateMachine for WebhookEventStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use WebhookEventStatus::*;
        match self {
            Received => vec![Verifying],
            Verifying => vec![Verified, Rejected],
            Verified => vec![Applying],
            Applying => vec![Applied, FailedRetryable, Failed],
            // Re-delivery re-verifies; the scheduler re-applies directly.
            FailedRetryable => vec![Verifying, Applying, Failed],
            // A later delivery may carry a valid signature (secret rotation).
            Rejected => vec![Verifying],
            Applied | Failed => vec![],
        }
    }
}

/// Outcome reported to the provider for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    Applied,
    DuplicateIgnored,
    Rejected,
    FailedRetryable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub provider_kind: ProviderKind,
    pub external_event_id: String,
    pub event_type: String,
    /// Hex SHA-256 of the raw body.
    pub payload_digest: String,
    pub status: WebhookEventStatus,
    pub attempts: u32,
    pub duplicate_deliveries: u32,
    pub last_error: Option<String>,
    /// Parsed form, kept so the scheduler can re-apply without the raw body.
    pub normalized: Option<NormalizedEvent>,
    pub subscription_id: Option<SubscriptionId>,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl WebhookEventRecord {
    pub fn received(event: &NormalizedEvent, raw_body: &[u8], now: Timestamp) -> Self {
        Self {
            provider_kind: event.provider_kind,
            external_event_id: event.external_event_id.clone(),
            event_type: event.raw_type.clone(),
            payload_digest: payload_digest(raw_body),
            status: WebhookEventStatus::Received,
            attempts: 0,
            duplicate_deliveries: 0,
            last_error: None,
            normalized: Some(event.clone()),
            subscription_id: None,
            received_at: now,
            processed_at: None,
        }
    }

    /// Record for a body that could not be parsed.
    ///
    /// Without an event id the digest becomes the key, so repeated
    /// deliveries of the same body share one record.
    pub fn unparseable(kind: ProviderKind, raw_body: &[u8], now: Timestamp) -> Self {
        let digest = payload_digest(raw_body);
        Self {
            provider_kind: kind,
            external_event_id: format!("{}{}", UNPARSEABLE_KEY_PREFIX, digest),
            event_type: "unparseable".to_string(),
            payload_digest: digest,
            status: WebhookEventStatus::Received,
            attempts: 0,
            duplicate_deliveries: 0,
            last_error: None,
            normalized: None,
            subscription_id: None,
            received_at: now,
            processed_at: None,
        }
    }

    /// Ends verification as `Rejected`.
    pub fn reject(&mut self, reason: impl Into<String>, now: Timestamp) -> Result<(), BillingError> {
        self.advance(WebhookEventStatus::Rejected)?;
        self.last_error = Some(reason.into());
        self.processed_at = Some(now);
        Ok(())
    }

    /// Moves to `target`, refusing edges the state machine does not list.
    pub fn advance(&mut self, target: WebhookEventStatus) -> Result<(), BillingError> {
        self.status = self.status.transition_to(target)?;
        Ok(())
    }

    pub fn mark_applied(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.advance(WebhookEventStatus::Applied)?;
        self.processed_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    /// Records a failed apply.
    ///
    /// A retryable failure stays retryable until `max_attempts` is reached.
    pub fn mark_failed(
        &mut self,
        error: &BillingError,
        retryable: bool,
        max_attempts: u32,
        now: Timestamp,
    ) -> Result<WebhookEventStatus, BillingError> {
        self.attempts += 1;
        self.last_error = Some(error.to_string());
        let target = if retryable && self.attempts < max_attempts {
            WebhookEventStatus::FailedRetryable
        } else {
            self.processed_at = Some(now);
            WebhookEventStatus::Failed
        };
        self.advance(target)?;
        Ok(target)
    }

    /// Whether processing started but never reached an outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.status,
            WebhookEventStatus::Received
                | WebhookEventStatus::Verifying
                | WebhookEventStatus::Verified
                | WebhookEventStatus::Applying
        )
    }

    /// Recovers a record left in flight by a crashed worker.
    ///
    /// The record becomes retryable so the next delivery or the scheduler
    /// picks it up again.
    pub fn recover_interrupted(&mut self) {
        if self.is_in_flight() {
            self.status = WebhookEventStatus::FailedRetryable;
            self.last_error = Some("processing interrupted".to_string());
        }
    }
}

/// Hex SHA-256 of a webhook body.
pub fn payload_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::NormalizedEventType;
    use crate::domain::foundation::ProviderId;

    fn event() -> NormalizedEvent {
        NormalizedEvent {
            provider_kind: ProviderKind::CardNetwork,
            external_event_id: "evt_1".into(),
            event_type: NormalizedEventType::PaymentFailed,
            raw_type: "invoice.payment_failed".into(),
            external_subscription_ref: Some("sub_1".into()),
            amount: None,
            period_end: None,
            provider_status: None,
            occurred_at: Timestamp::from_unix_secs(1_700_000_000).unwrap(),
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_100).unwrap()
    }

    fn applying_record() -> WebhookEventRecord {
        let mut record = WebhookEventRecord::received(&event(), b"{}", now());
        record.advance(WebhookEventStatus::Verifying).unwrap();
        record.advance(WebhookEventStatus::Verified).unwrap();
        record.advance(WebhookEventStatus::Applying).unwrap();
        record
    }

    #[test]
    fn received_record_captures_key_and_digest() {
        let record = WebhookEventRecord::received(&event(), b"{}", now());
        assert_eq!(record.status, WebhookEventStatus::Received);
        assert_eq!(record.external_event_id, "evt_1");
        assert_eq!(record.payload_digest.len(), 64);
    }

    #[test]
    fn unparseable_record_is_keyed_by_digest_and_rejectable() {
        let mut record = WebhookEventRecord::unparseable(ProviderKind::Wallet, b"{not json", now());
        assert_eq!(
            record.external_event_id,
            format!("digest:{}", payload_digest(b"{not json"))
        );
        assert!(record.normalized.is_none());

        record.advance(WebhookEventStatus::Verifying).unwrap();
        record.reject("invalid body", now()).unwrap();

        assert_eq!(record.status, WebhookEventStatus::Rejected);
        assert!(record.status.is_final());
        assert_eq!(record.processed_at, Some(now()));
    }

    #[test]
    fn received_cannot_skip_verification() {
        let mut record = WebhookEventRecord::received(&event(), b"{}", now());
        assert!(record.advance(WebhookEventStatus::Applying).is_err());
    }

    #[test]
    fn applied_is_final() {
        let mut record = applying_record();
        record.mark_applied(now()).unwrap();
        assert!(record.status.is_final());
        assert!(record.advance(WebhookEventStatus::Verifying).is_err());
    }

    #[test]
    fn retryable_failure_stays_retryable_until_budget_spent() {
        let mut record = applying_record();
        let err = BillingError::Storage("db down".into());

        assert_eq!(
            record.mark_failed(&err, err.is_retryable(), 2, now()).unwrap(),
            WebhookEventStatus::FailedRetryable
        );
        record.advance(WebhookEventStatus::Applying).unwrap();
        assert_eq!(
            record.mark_failed(&err, err.is_retryable(), 2, now()).unwrap(),
            WebhookEventStatus::Failed
        );
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn permanent_failure_is_terminal_immediately() {
        let mut record = applying_record();
        let err = BillingError::ProviderNotFound(ProviderId::new());
        assert_eq!(
            record.mark_failed(&err, err.is_retryable(), 5, now()).unwrap(),
            WebhookEventStatus::Failed
        );
    }

    #[test]
    fn interrupted_record_becomes_retryable() {
        let mut record = applying_record();
        assert!(record.is_in_flight());
        record.recover_interrupted();
        assert_eq!(record.status, WebhookEventStatus::FailedRetryable);
        record.advance(WebhookEventStatus::Verifying).unwrap();
    }

    #[test]
    fn recover_leaves_final_records_alone() {
        let mut record = applying_record();
        record.mark_applied(now()).unwrap();
        record.recover_interrupted();
        assert_eq!(record.status, WebhookEventStatus::Applied);
    }

    #[test]
    fn status_string_form_round_trips() {
        for s in ["received", "applied", "failed_retryable", "rejected"] {
            assert_eq!(WebhookEventStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(WebhookEventStatus::parse("processed").is_none());
    }
}
