//! Wallet processor gateway.
//!
//! JSON REST with bearer auth. Webhooks carry the transmission time in
//! `Wallet-Transmission-Time` and a hex HMAC-SHA256 of `"{time}.{body}"` in
//! `Wallet-Transmission-Sig`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

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

pub const TRANSMISSION_TIME_HEADER: &str = "Wallet-Transmission-Time";
pub const TRANSMISSION_SIG_HEADER: &str = "Wallet-Transmission-Sig";

pub struct WalletGateway {
    base_url: String,
    api_key: SecretString,
    webhook_secret: SecretString,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
    replay_tolerance_secs: i64,
}

impl WalletGateway {
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

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        self.http_client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(transport_error)
    }

    fn check_signature(&self, raw_body: &[u8], headers: &WebhookHeaders) -> Result<(), String> {
        let time = headers
            .get(TRANSMISSION_TIME_HEADER)
            .ok_or("missing transmission time")?;
        let sig = headers
            .get(TRANSMISSION_SIG_HEADER)
            .ok_or("missing transmission signature")?;
        let timestamp: i64 = time
            .trim()
            .parse()
            .map_err(|_| "transmission time is not a unix timestamp".to_string())?;

        signature::check_timestamp(timestamp, self.clock.now().as_unix_secs(), self.replay_tolerance_secs)
            .map_err(|e| e.to_string())?;

        let mut message = format!("{}.", timestamp).into_bytes();
        message.extend_from_slice(raw_body);
        signature::verify_hex(self.webhook_secret.expose_secret().as_bytes(), &message, sig)
            .map_err(|e| e.to_string())
    }
}

fn interval(period: BillingPeriod) -> &'static str {
    match period {
        BillingPeriod::Monthly => "MONTH",
        BillingPeriod::Yearly => "YEAR",
    }
}

#[async_trait]
impl ProviderGateway for WalletGateway {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wallet
    }

    async fn create_subscription(
        &self,
        tier: &SubscriptionTier,
        customer: &CustomerRef,
        trial_end: Option<Timestamp>,
    ) -> Result<ExternalRef, GatewayError> {
        let body = wire::CreateSubscription {
            plan: wire::Plan {
                name: &tier.name,
                amount: wire::Amount::from(&tier.price),
                interval: interval(tier.period),
            },
            subscriber: wire::Subscriber {
                reference: customer.user_id.as_str(),
                email: customer.email.as_deref(),
                payer_id: customer.external_customer_id.as_deref(),
            },
            payment_token: customer.payment_token.as_deref(),
            start_time: trial_end.map(|t| *t.as_datetime()),
        };
        let response = self.post_json("/v1/billing/subscriptions", &body).await?;
        let created: wire::Subscription = read_json(response, "create_subscription").await?;

        tracing::info!(subscription_ref = %created.id, "wallet subscription created");
        Ok(ExternalRef {
            subscription_ref: created.id,
            customer_ref: created.payer_id,
        })
    }

    async fn cancel_subscription(&self, external_ref: &str) -> Result<(), GatewayError> {
        let body = serde_json::json!({ "reason": "canceled by subscriber" });
        let response = self
            .post_json(&format!("/v1/billing/subscriptions/{}/cancel", external_ref), &body)
            .await?;
        expect_success(response, "cancel_subscription").await
    }

    async fn update_subscription(
        &self,
        external_ref: &str,
        tier: &SubscriptionTier,
        credit: &Money,
    ) -> Result<(), GatewayError> {
        let body = wire::Revise {
            plan: wire::Plan {
                name: &tier.name,
                amount: wire::Amount::from(&tier.price),
                interval: interval(tier.period),
            },
            outstanding_credit: (!credit.is_zero()).then(|| wire::Amount::from(credit)),
        };
        let response = self
            .post_json(&format!("/v1/billing/subscriptions/{}/revise", external_ref), &body)
            .await?;
        expect_success(response, "update_subscription").await?;
        tracing::info!(subscription_ref = %external_ref, tier_id = %tier.id, "wallet subscription revised");
        Ok(())
    }

    async fn charge(&self, external_ref: &str, amount: &Money) -> Result<ChargeReceipt, GatewayError> {
        let body = wire::Capture {
            amount: wire::Amount::from(amount),
        };
        let response = self
            .post_json(&format!("/v1/billing/subscriptions/{}/capture", external_ref), &body)
            .await?;
        let capture: wire::CaptureResult = read_json(response, "charge").await?;

        match capture.status.as_str() {
            "COMPLETED" | "PENDING" => Ok(ChargeReceipt {
                payment_ref: capture.id,
            }),
            other => {
                let err = GatewayError::permanent(format!("capture {}", other.to_ascii_lowercase()));
                Err(match capture.reason_code {
                    Some(code) => err.with_provider_code(code),
                    None => err,
                })
            }
        }
    }

    async fn refund(&self, payment_ref: &str, amount: &Money) -> Result<RefundReceipt, GatewayError> {
        let body = wire::Capture {
            amount: wire::Amount::from(amount),
        };
        let response = self
            .post_json(&format!("/v1/payments/captures/{}/refund", payment_ref), &body)
            .await?;
        let refund: wire::Refund = read_json(response, "refund").await?;
        Ok(RefundReceipt {
            refund_ref: refund.id,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], headers: &WebhookHeaders) -> bool {
        match self.check_signature(raw_body, headers) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(%reason, "wallet signature check failed");
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
            .get(self.url("/v1/identity/account"))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => match expect_success(response, "account").await {
                Ok(()) => ConnectivityReport::ok(latency_ms),
                Err(e) => ConnectivityReport::failed(latency_ms, e.to_string()),
            },
            Err(e) => ConnectivityReport::failed(latency_ms, transport_error(e).to_string()),
        }
    }
}

/// Translates a wallet event envelope.
pub(crate) fn parse_event(raw_body: &[u8]) -> Result<NormalizedEvent, GatewayError> {
    let event: wire::Event = serde_json::from_slice(raw_body)
        .map_err(|e| GatewayError::permanent(format!("invalid event JSON: {}", e)))?;

    let event_type = match event.event_type.as_str() {
        "PAYMENT.SALE.COMPLETED" => NormalizedEventType::PaymentSucceeded,
        "PAYMENT.SALE.DENIED" | "BILLING.SUBSCRIPTION.PAYMENT.FAILED" => {
            NormalizedEventType::PaymentFailed
        }
        "BILLING.SUBSCRIPTION.CANCELLED" => NormalizedEventType::SubscriptionCanceled,
        _ => NormalizedEventType::Ignored,
    };

    // Subscription events carry the subscription itself; payment events point at it.
    let subscription_ref = if event.event_type.starts_with("BILLING.SUBSCRIPTION.") {
        event
            .resource
            .billing_agreement_id
            .clone()
            .or_else(|| event.resource.id.clone())
    } else {
        event.resource.billing_agreement_id.clone()
    };

    let amount = match &event.resource.amount {
        Some(amount) => Some(Money::new(
            amount.total_minor,
            Currency::new(&amount.currency).map_err(|e| GatewayError::permanent(e.to_string()))?,
        )),
        None => None,
    };

    Ok(NormalizedEvent {
        provider_kind: ProviderKind::Wallet,
        external_event_id: event.id,
        event_type,
        raw_type: event.event_type,
        external_subscription_ref: subscription_ref,
        amount,
        period_end: event.resource.next_billing_time.map(Timestamp::from_datetime),
        provider_status: event.resource.state,
        occurred_at: Timestamp::from_datetime(event.create_time),
    })
}

mod wire {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Amount {
        pub total_minor: i64,
        pub currency: String,
    }

    impl From<&Money> for Amount {
        fn from(money: &Money) -> Self {
            Self {
                total_minor: money.amount_minor,
                currency: money.currency.to_string(),
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct Plan<'a> {
        pub name: &'a str,
        pub amount: Amount,
        pub interval: &'static str,
    }

    #[derive(Debug, Serialize)]
    pub struct Subscriber<'a> {
        pub reference: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub email: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub payer_id: Option<&'a str>,
    }

    #[derive(Debug, Serialize)]
    pub struct CreateSubscription<'a> {
        pub plan: Plan<'a>,
        pub subscriber: Subscriber<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub payment_token: Option<&'a str>,
        /// First billing instant; the end of the trial when there is one.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub start_time: Option<DateTime<Utc>>,
    }

    /// Plan change effective from the next billing cycle.
    #[derive(Debug, Serialize)]
    pub struct Revise<'a> {
        pub plan: Plan<'a>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub outstanding_credit: Option<Amount>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Subscription {
        pub id: String,
        #[serde(default)]
        pub payer_id: Option<String>,
    }

    #[derive(Debug, Serialize)]
    pub struct Capture {
        pub amount: Amount,
    }

    #[derive(Debug, Deserialize)]
    pub struct CaptureResult {
        pub id: String,
        pub status: String,
        #[serde(default)]
        pub reason_code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Refund {
        pub id: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Event {
        pub id: String,
        pub event_type: String,
        pub create_time: DateTime<Utc>,
        pub resource: Resource,
    }

    #[derive(Debug, Deserialize)]
    pub struct Resource {
        #[serde(default)]
        pub id: Option<String>,
        #[serde(default)]
        pub billing_agreement_id: Option<String>,
        #[serde(default)]
        pub state: Option<String>,
        #[serde(default)]
        pub amount: Option<Amount>,
        #[serde(default)]
        pub next_billing_time: Option<DateTime<Utc>>,
    }
}
