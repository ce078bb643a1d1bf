//! Card-network processor gateway.
//!
//! Form-encoded REST with HTTP basic auth (API key as user). Webhooks carry a
//! `Card-Signature: t=<unix>,v1=<hex>` header signing `"{t}.{body}"`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::billing::{
    signature, BillingPeriod, NormalizedEvent, NormalizedEventType, ProviderKind, SubscriptionTier,
};
use crate::domain::foundation::{Clock, Currency, Money, Timestamp};
use crate::ports::{
    ChargeReceipt, ConnectivityReport, CustomerRef, ExternalRef, GatewayError, ProviderGateway,
    RefundReceipt, WebhookHeaders,
};

use super::http_support::{build_client, expect_success, read_json, transport_error};
use super::GatewaySettings;

pub const SIGNATURE_HEADER: &str = "Card-Signature";

pub struct CardNetworkGateway {
    base_url: String,
    api_key: SecretString,
    webhook_secret: SecretString,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    replay_tolerance_secs: i64,
}

impl CardNetworkGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        Ok(Self {
            http_client: build_client(settings.timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.credentials.api_key,
            webhook_secret: settings.credentials.webhook_secret,
            clock: settings.clock,
            replay_tolerance_secs: settings.replay_tolerance_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        operation: &str,
    ) -> Result<T, GatewayError> {
        let response = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.api_key.expose_secret(), Option::<&str>::None)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response, operation).await
    }

    async fn create_customer(&self, customer: &CustomerRef) -> Result<String, GatewayError> {
        let mut params = vec![("metadata[user_id]", customer.user_id.to_string())];
        if let Some(email) = &customer.email {
            params.push(("email", email.clone()));
        }
        if let Some(token) = &customer.payment_token {
            params.push(("payment_method", token.clone()));
        }
        let created: wire::Customer = self.post_form("/v1/customers", &params, "create_customer").await?;
        Ok(created.id)
    }
}

fn interval(period: BillingPeriod) -> &'static str {
    match period {
        BillingPeriod::Monthly => "month",
        BillingPeriod::Yearly => "year",
    }
}

#[async_trait]
impl ProviderGateway for CardNetworkGateway {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CardNetwork
    }

    async fn create_subscription(
        &self,
        tier: &SubscriptionTier,
        customer: &CustomerRef,
        trial_end: Option<Timestamp>,
    ) -> Result<ExternalRef, GatewayError> {
        let customer_id = match &customer.external_customer_id {
            Some(id) => id.clone(),
            None => self.create_customer(customer).await?,
        };

        let mut params = vec![
            ("customer", customer_id.clone()),
            ("items[0][price_data][currency]", tier.price.currency.as_str().to_ascii_lowercase()),
            ("items[0][price_data][unit_amount]", tier.price.amount_minor.to_string()),
            ("items[0][price_data][recurring][interval]", interval(tier.period).to_string()),
            ("items[0][price_data][product_data][name]", tier.name.clone()),
            ("metadata[tier_id]", tier.id.to_string()),
            ("metadata[user_id]", customer.user_id.to_string()),
        ];
        if let Some(end) = trial_end {
            params.push(("trial_end", end.as_unix_secs().to_string()));
        }
        if let Some(token) = &customer.payment_token {
            params.push(("default_payment_method", token.clone()));
        }

        let sub: wire::Subscription = self
            .post_form("/v1/subscriptions", &params, "create_subscription")
            .await?;

        tracing::info!(subscription_ref = %sub.id, "card-network subscription created");
        Ok(ExternalRef {
            subscription_ref: sub.id,
            customer_ref: Some(sub.customer.unwrap_or(customer_id)),
        })
    }

    async fn cancel_subscription(&self, external_ref: &str) -> Result<(), GatewayError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/v1/subscriptions/{}", external_ref)))
            .basic_auth(self.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(response, "cancel_subscription").await
    }

    async fn update_subscription(
        &self,
        external_ref: &str,
        tier: &SubscriptionTier,
        credit: &Money,
    ) -> Result<(), GatewayError> {
        let params = [
            ("items[0][price_data][currency]", tier.price.currency.as_str().to_ascii_lowercase()),
            ("items[0][price_data][unit_amount]", tier.price.amount_minor.to_string()),
            ("items[0][price_data][recurring][interval]", interval(tier.period).to_string()),
            ("items[0][price_data][product_data][name]", tier.name.clone()),
            ("metadata[tier_id]", tier.id.to_string()),
            ("proration_behavior", "none".to_string()),
        ];
        let sub: wire::Subscription = self
            .post_form(
                &format!("/v1/subscriptions/{}", external_ref),
                &params,
                "update_subscription",
            )
            .await?;

        if !credit.is_zero() {
            // Negative invoice items reduce the next invoice of the subscription.
            let params = [
                ("subscription", sub.id.clone()),
                ("amount", (-credit.amount_minor).to_string()),
                ("currency", credit.currency.as_str().to_ascii_lowercase()),
                ("description", "tier change credit".to_string()),
            ];
            let _: serde::de::IgnoredAny = self
                .post_form("/v1/invoiceitems", &params, "update_subscription")
                .await?;
        }
        tracing::info!(subscription_ref = %sub.id, tier_id = %tier.id, credit_minor = credit.amount_minor, "card-network subscription updated");
        Ok(())
    }

    async fn charge(&self, external_ref: &str, amount: &Money) -> Result<ChargeReceipt, GatewayError> {
        let params = [
            ("amount", amount.amount_minor.to_string()),
            ("currency", amount.currency.as_str().to_ascii_lowercase()),
            ("subscription", external_ref.to_string()),
        ];
        let charge: wire::Charge = self.post_form("/v1/charges", &params, "charge").await?;

        if charge.status == "failed" {
            let err = GatewayError::permanent(
                charge
                    .failure_message
                    .unwrap_or_else(|| "charge failed".to_string()),
            );
            return Err(match charge.failure_code {
                Some(code) => err.with_provider_code(code),
                None => err,
            });
        }
        Ok(ChargeReceipt {
            payment_ref: charge.id,
        })
    }

    async fn refund(&self, payment_ref: &str, amount: &Money) -> Result<RefundReceipt, GatewayError> {
        let params = [
            ("charge", payment_ref.to_string()),
            ("amount", amount.amount_minor.to_string()),
        ];
        let refund: wire::Refund = self.post_form("/v1/refunds", &params, "refund").await?;
        Ok(RefundReceipt {
            refund_ref: refund.id,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], headers: &WebhookHeaders) -> bool {
        let header = match headers.get(SIGNATURE_HEADER) {
            Some(h) => h,
            None => {
                tracing::warn!("card-network webhook without signature header");
                return false;
            }
        };
        let now = self.clock.now().as_unix_secs();
        match signature::verify_timestamped(
            self.webhook_secret.expose_secret().as_bytes(),
            header,
            raw_body,
            now,
            self.replay_tolerance_secs,
        ) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(%reason, "card-network signature check failed");
                false
            }
        }
    }

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<NormalizedEvent, GatewayError> {
        parse_event(raw_body)
    }

    async fn test_connectivity(&self) -> ConnectivityReport {
        let started = Instant::now();
        let result = self
            .http_client
            .get(self.url("/v1/balance"))
            .basic_auth(self.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => match expect_success(response, "balance").await {
                Ok(()) => ConnectivityReport::ok(latency_ms),
                Err(e) => ConnectivityReport::failed(latency_ms, e.to_string()),
            },
            Err(e) => ConnectivityReport::failed(latency_ms, transport_error(e).to_string()),
        }
    }
}

/// Translates a card-network event envelope.
pub(crate) fn parse_event(raw_body: &[u8]) -> Result<NormalizedEvent, GatewayError> {
    let event: wire::Event = serde_json::from_slice(raw_body)
        .map_err(|e| GatewayError::permanent(format!("invalid event JSON: {}", e)))?;

    let occurred_at = Timestamp::from_unix_secs(event.created)
        .ok_or_else(|| GatewayError::permanent("event timestamp out of range"))?;

    let (event_type, subscription_ref, amount, period_end, status) = match event.event_type.as_str() {
        "invoice.paid" | "invoice.payment_succeeded" | "invoice.payment_failed" => {
            let invoice: wire::Invoice = serde_json::from_value(event.data.object)
                .map_err(|e| GatewayError::permanent(format!("invalid invoice: {}", e)))?;
            let succeeded = event.event_type != "invoice.payment_failed";
            let minor = if succeeded {
                invoice.amount_paid
            } else {
                invoice.amount_due
            };
            let amount = match (minor, invoice.currency) {
                (Some(minor), Some(code)) => Some(Money::new(
                    minor,
                    Currency::new(&code)
                        .map_err(|e| GatewayError::permanent(e.to_string()))?,
                )),
                _ => None,
            };
            let period_end = invoice
                .lines
                .and_then(|lines| lines.data.into_iter().next())
                .and_then(|line| Timestamp::from_unix_secs(line.period.end));
            let kind = if succeeded {
                NormalizedEventType::PaymentSucceeded
            } else {
                NormalizedEventType::PaymentFailed
            };
            (kind, invoice.subscription, amount, period_end, invoice.status)
        }
        "customer.subscription.deleted" => {
            let sub: wire::Subscription = serde_json::from_value(event.data.object)
                .map_err(|e| GatewayError::permanent(format!("invalid subscription: {}", e)))?;
            (
                NormalizedEventType::SubscriptionCanceled,
                Some(sub.id),
                None,
                None,
                sub.status,
            )
        }
        _ => {
            let subscription_ref = event
                .data
                .object
                .get("subscription")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            (NormalizedEventType::Ignored, subscription_ref, None, None, None)
        }
    };

    Ok(NormalizedEvent {
        provider_kind: ProviderKind::CardNetwork,
        external_event_id: event.id,
        event_type,
        raw_type: event.event_type,
        external_subscription_ref: subscription_ref,
        amount,
        period_end,
        provider_status: status,
        occurred_at,
    })
}

mod wire {
    use super::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Event {
        pub id: String,
        #[serde(rename = "type")]
        pub event_type: String,
        pub created: i64,
        pub data: EventData,
    }

    #[derive(Debug, Deserialize)]
    pub struct EventData {
        pub object: serde_json::Value,
    }

    #[derive(Debug, Deserialize)]
    pub struct Customer {
        pub id: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Subscription {
        pub id: String,
        #[serde(default)]
        pub customer: Option<String>,
        #[serde(default)]
        pub status: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Invoice {
        #[serde(default)]
        pub subscription: Option<String>,
        #[serde(default)]
        pub amount_paid: Option<i64>,
        #[serde(default)]
        pub amount_due: Option<i64>,
        #[serde(default)]
        pub currency: Option<String>,
        #[serde(default)]
        pub status: Option<String>,
        #[serde(default)]
        pub lines: Option<InvoiceLines>,
    }

    #[derive(Debug, Deserialize)]
    pub struct InvoiceLines {
        pub data: Vec<InvoiceLine>,
    }

    #[derive(Debug, Deserialize)]
    pub struct InvoiceLine {
        pub period: Period,
    }

    #[derive(Debug, Deserialize)]
    pub struct Period {
        pub end: i64,
    }

    #[derive(Debug, Deserialize)]
    pub struct Charge {
        pub id: String,
        pub status: String,
        #[serde(default)]
        pub failure_code: Option<String>,
        #[serde(default)]
        pub failure_message: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Refund {
        pub id: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::ProviderCredentials;
    use crate::domain::foundation::ManualClock;
    use std::time::Duration;

    const SECRET: &str = "whsec_card_test";
    const NOW: i64 = 1_700_000_000;

    fn gateway() -> CardNetworkGateway {
        CardNetworkGateway::new(GatewaySettings {
            base_url: "http://127.0.0.1:9".into(),
            credentials: ProviderCredentials::new("sk_test", SECRET, None),
            timeout: Duration::from_secs(1),
            clock: Arc::new(ManualClock::starting_at(Timestamp::from_unix_secs(NOW).unwrap())),
            replay_tolerance_secs: 300,
        })
        .unwrap()
    }

    fn invoice_event(kind: &str) -> Vec<u8> {
        serde_json::json!({
            "id": "evt_123",
            "type": kind,
            "created": NOW - 10,
            "data": {"object": {
                "id": "in_1",
                "subscription": "sub_42",
                "amount_paid": 3000,
                "amount_due": 3000,
                "currency": "usd",
                "status": "paid",
                "lines": {"data": [{"period": {"start": NOW, "end": NOW + 2_592_000}}]}
            }}
        })
        .to_string()
        .into_bytes()
    }

    // ══════════════════════════════════════════════════════════════
    // Signature verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_correctly_signed_payload() {
        let body = invoice_event("invoice.paid");
        let header = signature::sign_timestamped(SECRET.as_bytes(), NOW - 5, &body).unwrap();
        let headers = WebhookHeaders::new().with(SIGNATURE_HEADER, header);
        assert!(gateway().verify_webhook_signature(&body, &headers));
    }

    #[test]
    fn rejects_payload_signed_with_other_secret() {
        let body = invoice_event("invoice.paid");
        let header = signature::sign_timestamped(b"whsec_other", NOW, &body).unwrap();
        let headers = WebhookHeaders::new().with(SIGNATURE_HEADER, header);
        assert!(!gateway().verify_webhook_signature(&body, &headers));
    }

    #[test]
    fn rejects_replayed_delivery_outside_tolerance() {
        let body = invoice_event("invoice.paid");
        let header = signature::sign_timestamped(SECRET.as_bytes(), NOW - 301, &body).unwrap();
        let headers = WebhookHeaders::new().with(SIGNATURE_HEADER, header);
        assert!(!gateway().verify_webhook_signature(&body, &headers));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(!gateway().verify_webhook_signature(b"{}", &WebhookHeaders::new()));
    }

    // ══════════════════════════════════════════════════════════════
    // Event parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn paid_invoice_normalizes_to_payment_succeeded() {
        let event = parse_event(&invoice_event("invoice.paid")).unwrap();
        assert_eq!(event.event_type, NormalizedEventType::PaymentSucceeded);
        assert_eq!(event.external_event_id, "evt_123");
        assert_eq!(event.external_subscription_ref.as_deref(), Some("sub_42"));
        assert_eq!(event.amount, Some(Money::new(3000, Currency::usd())));
        assert_eq!(event.period_end, Timestamp::from_unix_secs(NOW + 2_592_000));
        assert_eq!(event.occurred_at, Timestamp::from_unix_secs(NOW - 10).unwrap());
    }

    #[test]
    fn failed_invoice_normalizes_to_payment_failed() {
        let event = parse_event(&invoice_event("invoice.payment_failed")).unwrap();
        assert_eq!(event.event_type, NormalizedEventType::PaymentFailed);
    }

    #[test]
    fn deleted_subscription_normalizes_to_cancel() {
        let body = serde_json::json!({
            "id": "evt_9", "type": "customer.subscription.deleted", "created": NOW,
            "data": {"object": {"id": "sub_42", "status": "canceled"}}
        })
        .to_string();
        let event = parse_event(body.as_bytes()).unwrap();
        assert_eq!(event.event_type, NormalizedEventType::SubscriptionCanceled);
        assert_eq!(event.external_subscription_ref.as_deref(), Some("sub_42"));
    }

    #[test]
    fn unknown_types_are_ignored_not_rejected() {
        let body = serde_json::json!({
            "id": "evt_7", "type": "customer.updated", "created": NOW,
            "data": {"object": {"id": "cus_1"}}
        })
        .to_string();
        let event = parse_event(body.as_bytes()).unwrap();
        assert_eq!(event.event_type, NormalizedEventType::Ignored);
        assert_eq!(event.raw_type, "customer.updated");
    }

    #[test]
    fn garbage_is_a_permanent_error() {
        let err = parse_event(b"not json").unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn connectivity_failure_reports_diagnostic() {
        let report = gateway().test_connectivity().await;
        assert!(!report.success);
        assert!(!report.diagnostic.is_empty());
    }
}
