//! WebhookIngestor - Exactly-once application of provider webhooks.
//!
//! One delivery walks the stored record through
//! `Received -> Verifying -> Verified -> Applying -> Applied`, or ends in
//! `Rejected`, `FailedRetryable` or `Failed`. The record keyed by
//! (provider kind, external event id) is written before any processing and
//! is what makes re-delivery harmless.
//!
//! The event id lives inside the payload, so the body is parsed before the
//! event's record is written. A body that cannot be parsed still gets a
//! `Rejected` record, keyed by its payload digest.
//!
//! # Response mapping
//!
//! | Outcome            | HTTP |
//! |--------------------|------|
//! | `Applied`          | 200  |
//! | `DuplicateIgnored` | 200  |
//! | `Rejected`         | 400 (unparseable), 401 (signature), 404 (no provider) |
//! | `FailedRetryable`  | 500  |
//! | `Failed`           | 422  |

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::billing::{
    payload_digest, BillingError, ConfigSnapshot, IngestOutcome, NormalizedEvent, ProviderKind,
    WebhookEventRecord, WebhookEventStatus,
};
use crate::domain::foundation::Clock;
use crate::ports::{
    GatewayError, GatewayRegistry, OperatorAlert, OperatorAlerter, ProviderGateway, SaveResult, WebhookEventRepository,
    WebhookHeaders,
};

use super::state_machine::SubscriptionStateMachine;

/// A record left in flight longer than this is presumed abandoned.
const IN_FLIGHT_STALL_SECS: i64 = 300;

/// What the HTTP layer answers the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResponse {
    pub outcome: IngestOutcome,
    #[serde(skip)]
    pub status: u16,
    pub event_id: Option<String>,
    pub message: String,
}

impl IngestResponse {
    fn new(outcome: IngestOutcome, status: u16, event_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            outcome,
            status,
            event_id: event_id.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Counts from one scheduler pass over retryable records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessReport {
    pub applied: usize,
    pub still_retryable: usize,
    pub failed: usize,
}

pub struct WebhookIngestor {
    config: watch::Receiver<Arc<ConfigSnapshot>>,
    gateways: Arc<dyn GatewayRegistry>,
    events: Arc<dyn WebhookEventRepository>,
    machine: Arc<SubscriptionStateMachine>,
    alerter: Arc<dyn OperatorAlerter>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl WebhookIngestor {
    pub fn new(
        config: watch::Receiver<Arc<ConfigSnapshot>>,
        gateways: Arc<dyn GatewayRegistry>,
        events: Arc<dyn WebhookEventRepository>,
        machine: Arc<SubscriptionStateMachine>,
        alerter: Arc<dyn OperatorAlerter>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            config,
            gateways,
            events,
            machine,
            alerter,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Handles one delivery for a provider kind.
    pub async fn ingest(&self, kind: ProviderKind, raw_body: &[u8], headers: &WebhookHeaders) -> IngestResponse {
        match self.try_ingest(kind, raw_body, headers).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    provider_kind = %kind,
                    payload_digest = %payload_digest(raw_body),
                    error = %e,
                    "webhook processing failed before an outcome was recorded"
                );
                IngestResponse::new(IngestOutcome::FailedRetryable, 500, None, "temporarily unable to process")
            }
        }
    }

    async fn try_ingest(
        &self,
        kind: ProviderKind,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> Result<IngestResponse, BillingError> {
        let gateways = self.gateways_of_kind(kind);
        let gateways = match gateways {
            None => {
                tracing::warn!(provider_kind = %kind, "webhook for a provider kind with no configuration");
                return Ok(IngestResponse::new(
                    IngestOutcome::Rejected,
                    404,
                    None,
                    format!("no {} provider configured", kind),
                ));
            }
            Some(gateways) if gateways.is_empty() => {
                return Err(BillingError::config_invalid(
                    None,
                    format!("no usable {} gateway could be built", kind),
                ));
            }
            Some(gateways) => gateways,
        };

        let event = match gateways[0].parse_webhook_event(raw_body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    provider_kind = %kind,
                    payload_digest = %payload_digest(raw_body),
                    error = %e,
                    "webhook payload rejected as malformed"
                );
                let key = self.record_unparseable(kind, raw_body, &e).await?;
                return Ok(IngestResponse::new(IngestOutcome::Rejected, 400, Some(&key), "malformed payload"));
            }
        };
        let event_id = event.external_event_id.clone();
        let now = self.clock.now();

        let mut record = match self
            .events
            .insert_if_absent(&WebhookEventRecord::received(&event, raw_body, now))
            .await?
        {
            SaveResult::Inserted => WebhookEventRecord::received(&event, raw_body, now),
            SaveResult::AlreadyExists(mut existing) => match existing.status {
                WebhookEventStatus::Applied => {
                    existing.duplicate_deliveries += 1;
                    self.events.update(&existing).await?;
                    tracing::info!(provider_kind = %kind, event_id = %event_id, "duplicate delivery ignored");
                    return Ok(IngestResponse::new(
                        IngestOutcome::DuplicateIgnored,
                        200,
                        Some(&event_id),
                        "already applied",
                    ));
                }
                WebhookEventStatus::Failed => {
                    tracing::info!(provider_kind = %kind, event_id = %event_id, "delivery of a failed event ignored");
                    return Ok(IngestResponse::new(
                        IngestOutcome::DuplicateIgnored,
                        200,
                        Some(&event_id),
                        "already processed",
                    ));
                }
                _ if existing.is_in_flight() => {
                    let stalled_for = now.as_unix_secs() - existing.received_at.as_unix_secs();
                    if stalled_for < IN_FLIGHT_STALL_SECS {
                        return Ok(IngestResponse::new(
                            IngestOutcome::FailedRetryable,
                            500,
                            Some(&event_id),
                            "delivery already in progress",
                        ));
                    }
                    tracing::warn!(provider_kind = %kind, event_id = %event_id, stalled_for, "recovering abandoned webhook record");
                    existing.recover_interrupted();
                    existing
                }
                _ => existing,
            },
        };

        record.advance(WebhookEventStatus::Verifying)?;
        self.events.update(&record).await?;

        if !gateways.iter().any(|g| g.verify_webhook_signature(raw_body, headers)) {
            tracing::warn!(
                provider_kind = %kind,
                event_id = %event_id,
                payload_digest = %record.payload_digest,
                "webhook signature rejected"
            );
            record.reject("signature verification failed", now)?;
            self.events.update(&record).await?;
            return Ok(IngestResponse::new(
                IngestOutcome::Rejected,
                401,
                Some(&event_id),
                "signature verification failed",
            ));
        }

        record.advance(WebhookEventStatus::Verified)?;
        record.advance(WebhookEventStatus::Applying)?;
        record.normalized = Some(event.clone());
        self.events.update(&record).await?;

        self.apply(&mut record, &event).await
    }

    /// Stores a `Rejected` record for a body no gateway could parse and
    /// returns its key. Re-deliveries of the same body only bump the
    /// duplicate counter.
    async fn record_unparseable(
        &self,
        kind: ProviderKind,
        raw_body: &[u8],
        error: &GatewayError,
    ) -> Result<String, BillingError> {
        let now = self.clock.now();
        let mut record = WebhookEventRecord::unparseable(kind, raw_body, now);
        match self.events.insert_if_absent(&record).await? {
            SaveResult::Inserted => {
                record.advance(WebhookEventStatus::Verifying)?;
                record.reject(format!("unparseable payload: {}", error), now)?;
                self.events.update(&record).await?;
            }
            SaveResult::AlreadyExists(mut existing) => {
                existing.duplicate_deliveries += 1;
                self.events.update(&existing).await?;
            }
        }
        Ok(record.external_event_id)
    }

    /// Re-applies stored events left retryable. Called by the scheduler.
    pub async fn reprocess_retryable(&self, limit: usize) -> Result<ReprocessReport, BillingError> {
        let mut report = ReprocessReport::default();
        for mut record in self.events.find_retryable(limit).await? {
            let event = match record.normalized.clone() {
                Some(event) if record.attempts < self.max_attempts => event,
                _ => {
                    record.advance(WebhookEventStatus::Failed)?;
                    record.processed_at = Some(self.clock.now());
                    self.events.update(&record).await?;
                    self.alert_failed(&record).await;
                    report.failed += 1;
                    continue;
                }
            };

            record.advance(WebhookEventStatus::Applying)?;
            self.events.update(&record).await?;
            let response = self.apply(&mut record, &event).await?;
            match response.outcome {
                IngestOutcome::Applied => report.applied += 1,
                IngestOutcome::FailedRetryable => report.still_retryable += 1,
                _ => report.failed += 1,
            }
        }
        if report != ReprocessReport::default() {
            tracing::info!(?report, "retryable webhook events reprocessed");
        }
        Ok(report)
    }

    /// Final step for a record in `Applying`.
    async fn apply(
        &self,
        record: &mut WebhookEventRecord,
        event: &NormalizedEvent,
    ) -> Result<IngestResponse, BillingError> {
        let event_id = event.external_event_id.clone();
        let now = self.clock.now();

        match self.machine.apply_event(event).await {
            Ok(applied) => {
                record.subscription_id = applied.subscription_id;
                record.mark_applied(now)?;
                self.events.update(record).await?;
                Ok(IngestResponse::new(IngestOutcome::Applied, 200, Some(&event_id), "applied"))
            }
            Err(e @ BillingError::InvalidTransition { .. }) => {
                // Nothing to change for this subscription; acknowledged so the
                // provider stops re-delivering.
                tracing::warn!(event_id = %event_id, error = %e, "event does not apply in the current state");
                record.mark_applied(now)?;
                record.last_error = Some(e.to_string());
                self.events.update(record).await?;
                Ok(IngestResponse::new(IngestOutcome::Applied, 200, Some(&event_id), "acknowledged, no change"))
            }
            Err(e) => {
                let retryable = e.is_retryable() || matches!(e, BillingError::SubscriptionNotFound(_));
                let status = record.mark_failed(&e, retryable, self.max_attempts, now)?;
                self.events.update(record).await?;

                if status == WebhookEventStatus::FailedRetryable {
                    tracing::warn!(event_id = %event_id, attempts = record.attempts, error = %e, "event will be retried");
                    return Ok(IngestResponse::new(
                        IngestOutcome::FailedRetryable,
                        500,
                        Some(&event_id),
                        "temporarily unable to apply",
                    ));
                }
                tracing::error!(event_id = %event_id, attempts = record.attempts, error = %e, "event failed permanently");
                self.alert_failed(record).await;
                Ok(IngestResponse::new(IngestOutcome::Failed, 422, Some(&event_id), e.to_string()))
            }
        }
    }

    /// Gateways for every configured provider of `kind`.
    ///
    /// `None` when no provider of the kind is configured; an empty list when
    /// some are configured but none could be built.
    fn gateways_of_kind(&self, kind: ProviderKind) -> Option<Vec<Arc<dyn ProviderGateway>>> {
        let snapshot = self.config.borrow().clone();
        let configs = snapshot.providers_of_kind(kind);
        if configs.is_empty() {
            return None;
        }
        let gateways = configs
            .into_iter()
            .filter_map(|config| match self.gateways.gateway_for(config) {
                Ok(gateway) => Some(gateway),
                Err(e) => {
                    tracing::error!(provider_id = %config.id, error = %e, "gateway unavailable for webhook");
                    None
                }
            })
            .collect();
        Some(gateways)
    }

    async fn alert_failed(&self, record: &WebhookEventRecord) {
        if let Err(e) = self.alerter.alert(OperatorAlert::webhook_failed(record)).await {
            tracing::warn!(error = %e, "operator alert not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateways::MockGateway;
    use crate::application::testing::TestBed;
    use crate::domain::billing::{ProviderConfiguration, SubscriptionStatus};
    use crate::ports::WebhookEventRepository;

    fn ingestor(bed: &TestBed, max_attempts: u32) -> WebhookIngestor {
        WebhookIngestor::new(
            bed.config.subscribe(),
            bed.gateways.clone(),
            bed.events.clone(),
            bed.machine.clone(),
            bed.notifier.clone(),
            Arc::new(bed.clock.clone()),
            max_attempts,
        )
    }

    async fn setup() -> (TestBed, ProviderConfiguration, MockGateway) {
        let bed = TestBed::without_trial().await;
        let (config, gateway) = bed.add_provider(ProviderKind::CardNetwork, 1);
        (bed, config, gateway)
    }

    fn signed(gateway: &MockGateway, id: &str, kind: &str, sub_ref: &str, bed: &TestBed) -> (Vec<u8>, WebhookHeaders) {
        let body = MockGateway::event_body(id, kind, sub_ref, bed.clock.now());
        let headers = gateway.sign(&body);
        (body, headers)
    }

    async fn stored(bed: &TestBed, id: &str) -> WebhookEventRecord {
        bed.events.find(ProviderKind::CardNetwork, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn valid_event_is_applied() {
        let (bed, config, gateway) = setup().await;
        let sub = bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);

        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;

        assert_eq!(response.outcome, IngestOutcome::Applied);
        assert_eq!(response.status, 200);
        assert_eq!(bed.reload(&sub).await.status, SubscriptionStatus::PastDue);
        let record = stored(&bed, "evt_1").await;
        assert_eq!(record.status, WebhookEventStatus::Applied);
        assert_eq!(record.subscription_id, Some(sub.id));
    }

    #[tokio::test]
    async fn redelivery_is_acknowledged_without_reapplying() {
        let (bed, config, gateway) = setup().await;
        let sub = bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);

        ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        let version = bed.reload(&sub).await.version;
        let again = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;

        assert_eq!(again.outcome, IngestOutcome::DuplicateIgnored);
        assert_eq!(again.status, 200);
        assert_eq!(bed.reload(&sub).await.version, version);
        assert_eq!(stored(&bed, "evt_1").await.duplicate_deliveries, 1);
        assert_eq!(bed.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_and_recorded() {
        let (bed, config, _gateway) = setup().await;
        let sub = bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = ingestor(&bed, 3);
        let body = MockGateway::event_body("evt_1", "payment_failed", "mock_sub_a", bed.clock.now());
        let forged = MockGateway::with_secret(ProviderKind::CardNetwork, "attacker").sign(&body);

        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &forged).await;

        assert_eq!(response.outcome, IngestOutcome::Rejected);
        assert_eq!(response.status, 401);
        assert_eq!(bed.reload(&sub).await.status, SubscriptionStatus::Active);
        assert_eq!(stored(&bed, "evt_1").await.status, WebhookEventStatus::Rejected);
    }

    #[tokio::test]
    async fn rejected_event_can_be_redelivered_with_a_valid_signature() {
        let (bed, config, gateway) = setup().await;
        bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);

        ingestor.ingest(ProviderKind::CardNetwork, &body, &WebhookHeaders::new()).await;
        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;

        assert_eq!(response.outcome, IngestOutcome::Applied);
    }

    #[tokio::test]
    async fn garbage_body_is_rejected_and_recorded_by_digest() {
        let (bed, _config, _gateway) = setup().await;
        let ingestor = ingestor(&bed, 3);
        let key = format!("digest:{}", payload_digest(b"{not json"));

        let response = ingestor
            .ingest(ProviderKind::CardNetwork, b"{not json", &WebhookHeaders::new())
            .await;

        assert_eq!(response.outcome, IngestOutcome::Rejected);
        assert_eq!(response.status, 400);
        assert_eq!(response.event_id.as_deref(), Some(key.as_str()));
        let record = stored(&bed, &key).await;
        assert_eq!(record.status, WebhookEventStatus::Rejected);
        assert_eq!(record.event_type, "unparseable");
        assert!(record.last_error.unwrap().contains("unparseable payload"));

        ingestor
            .ingest(ProviderKind::CardNetwork, b"{not json", &WebhookHeaders::new())
            .await;

        assert_eq!(bed.events.len().await, 1);
        assert_eq!(stored(&bed, &key).await.duplicate_deliveries, 1);
    }

    #[tokio::test]
    async fn unconfigured_kind_is_not_found() {
        let (bed, _config, gateway) = setup().await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "x", &bed);

        let response = ingestor.ingest(ProviderKind::Wallet, &body, &headers).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn event_for_unknown_subscription_is_retryable_then_applied() {
        let (bed, config, gateway) = setup().await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_late", &bed);

        let first = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        assert_eq!(first.outcome, IngestOutcome::FailedRetryable);
        assert_eq!(first.status, 500);
        assert_eq!(stored(&bed, "evt_1").await.status, WebhookEventStatus::FailedRetryable);

        let sub = bed.subscribe(&config, "mock_sub_late").await;
        let report = ingestor.reprocess_retryable(10).await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(bed.reload(&sub).await.status, SubscriptionStatus::PastDue);
        assert_eq!(stored(&bed, "evt_1").await.status, WebhookEventStatus::Applied);
    }

    #[tokio::test]
    async fn retryable_failures_are_bounded_and_alert() {
        let (bed, _config, gateway) = setup().await;
        let ingestor = ingestor(&bed, 2);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_never", &bed);

        ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        let report = ingestor.reprocess_retryable(10).await.unwrap();

        assert_eq!(report.failed, 1);
        let record = stored(&bed, "evt_1").await;
        assert_eq!(record.status, WebhookEventStatus::Failed);
        assert_eq!(record.attempts, 2);
        assert!(bed
            .notifier
            .alerts()
            .iter()
            .any(|a| matches!(a, OperatorAlert::WebhookFailed { .. })));

        let again = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        assert_eq!(again.outcome, IngestOutcome::DuplicateIgnored);
    }

    #[tokio::test]
    async fn event_that_does_not_fit_the_state_is_acknowledged() {
        let (bed, config, gateway) = setup().await;
        let sub = bed.subscribe(&config, "mock_sub_a").await;
        bed.machine
            .apply_trigger(sub.id, crate::domain::billing::LifecycleTrigger::CancelRequested)
            .await
            .unwrap();
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);

        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;

        assert_eq!(response.outcome, IngestOutcome::Applied);
        assert_eq!(bed.reload(&sub).await.status, SubscriptionStatus::Canceled);
        assert!(stored(&bed, "evt_1").await.last_error.is_some());
    }

    #[tokio::test]
    async fn ignored_event_types_are_applied_as_no_ops() {
        let (bed, _config, gateway) = setup().await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "customer_updated", "mock_sub_a", &bed);

        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        assert_eq!(response.outcome, IngestOutcome::Applied);
    }

    #[tokio::test]
    async fn delivery_racing_an_in_flight_record_is_deferred() {
        let (bed, config, gateway) = setup().await;
        bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = ingestor(&bed, 3);
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);
        let event = gateway.parse_webhook_event(&body).unwrap();
        bed.events
            .insert_if_absent(&WebhookEventRecord::received(&event, &body, bed.clock.now()))
            .await
            .unwrap();

        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        assert_eq!(response.status, 500);
        assert_eq!(stored(&bed, "evt_1").await.status, WebhookEventStatus::Received);

        bed.clock.advance(chrono::Duration::seconds(IN_FLIGHT_STALL_SECS));
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);
        let response = ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await;
        assert_eq!(response.outcome, IngestOutcome::Applied);
    }

    #[tokio::test]
    async fn concurrent_deliveries_apply_once() {
        let (bed, config, gateway) = setup().await;
        let sub = bed.subscribe(&config, "mock_sub_a").await;
        let ingestor = Arc::new(ingestor(&bed, 3));
        let (body, headers) = signed(&gateway, "evt_1", "payment_failed", "mock_sub_a", &bed);

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let ingestor = ingestor.clone();
            let body = body.clone();
            let headers = headers.clone();
            tasks.push(tokio::spawn(async move {
                ingestor.ingest(ProviderKind::CardNetwork, &body, &headers).await
            }));
        }
        let mut applied = 0;
        for task in tasks {
            if task.await.unwrap().outcome == IngestOutcome::Applied {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(bed.reload(&sub).await.version, 1);
        assert_eq!(bed.notifier.notifications().len(), 1);
    }
}
