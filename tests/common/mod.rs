//! Shared harness for HTTP-level integration tests.
//!
//! Builds the full engine on in-memory storage with mock gateways and a
//! manual clock, and drives it through the real router.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use subscription_billing::adapters::auth::StaticAdminTokenValidator;
use subscription_billing::adapters::crypto::AesGcmCredentialCipher;
use subscription_billing::adapters::gateways::{MockGateway, StaticGatewayRegistry};
use subscription_billing::adapters::http::{api_router, AppState};
use subscription_billing::adapters::notify::RecordingNotifier;
use subscription_billing::app::{BillingApp, Collaborators, Repositories};
use subscription_billing::application::BillingScheduler;
use subscription_billing::config::BillingConfig;
use subscription_billing::domain::billing::ProviderKind;
use subscription_billing::domain::foundation::{ManualClock, ProviderId, Timestamp};
use subscription_billing::ports::WebhookHeaders;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const SUPPORT_TOKEN: &str = "support-token";

pub struct Harness {
    pub router: Router,
    pub state: AppState,
    pub scheduler: BillingScheduler,
    pub repos: Repositories,
    pub gateways: Arc<StaticGatewayRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: ManualClock,
}

pub struct Response {
    pub status: StatusCode,
    pub body: Value,
}

impl Harness {
    pub async fn new() -> Self {
        let clock = ManualClock::starting_at(Timestamp::from_unix_secs(1_700_000_000).unwrap());
        let repos = Repositories::in_memory();
        let gateways = Arc::new(StaticGatewayRegistry::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let validator = StaticAdminTokenValidator::new("billing_admin")
            .with_identity(ADMIN_TOKEN, "ops@example.com", &["billing_admin"])
            .with_identity(SUPPORT_TOKEN, "support@example.com", &["support"]);
        let billing: BillingConfig = serde_json::from_value(json!({
            "encryption_key": "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=",
            "max_webhook_attempts": 3
        }))
        .unwrap();

        let app = BillingApp::assemble(
            repos.clone(),
            Collaborators {
                gateways: gateways.clone(),
                cipher: Arc::new(AesGcmCredentialCipher::new(&billing.encryption_key_bytes().unwrap())),
                clock: Arc::new(clock.clone()),
                admin_validator: Arc::new(validator),
                notifier: notifier.clone(),
                alerter: notifier.clone(),
            },
            &billing,
        )
        .await
        .unwrap();

        Self {
            router: api_router(app.state.clone(), Duration::from_secs(30)),
            state: app.state,
            scheduler: app.scheduler,
            repos,
            gateways,
            notifier,
            clock,
        }
    }

    /// A harness whose policy grants no trial.
    pub async fn without_trial() -> Self {
        let h = Self::new().await;
        h.set_policy(json!({
            "default_currency": "USD",
            "grace_period_days": 7,
            "trial_enabled": false,
            "default_trial_days": 0,
            "max_payment_retries": 2,
            "retry_interval_days": 1
        }))
        .await;
        h
    }

    pub async fn send(&self, method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Vec<u8>>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(bytes) => builder
                .header("content-type", "application/json")
                .body(Body::from(bytes))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Response { status, body }
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let auth = format!("Bearer {}", ADMIN_TOKEN);
        self.send(method, uri, &[("authorization", auth.as_str())], body.map(|b| b.to_string().into_bytes()))
            .await
    }

    pub async fn user(&self, user: &str, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.send(method, uri, &[("x-user-id", user)], body.map(|b| b.to_string().into_bytes()))
            .await
    }

    pub async fn set_policy(&self, policy: Value) {
        let response = self.admin(Method::PUT, "/admin/policy", Some(policy)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    }

    /// Registers a provider through the admin API and backs it with a mock.
    pub async fn add_provider(&self, kind: ProviderKind, priority: u32) -> (ProviderId, MockGateway) {
        let response = self
            .admin(Method::POST, "/admin/providers", Some(provider_request(kind, priority)))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        let id: ProviderId = serde_json::from_value(response.body["id"].clone()).unwrap();

        let gateway = MockGateway::new(kind);
        self.gateways.register(id, Arc::new(gateway.clone()));
        (id, gateway)
    }

    /// Creates a monthly USD tier and returns its id.
    pub async fn add_tier(&self, name: &str, amount_minor: i64) -> String {
        let response = self
            .admin(
                Method::POST,
                "/admin/tiers",
                Some(json!({
                    "name": name,
                    "price": {"amount_minor": amount_minor, "currency": "USD"},
                    "period": "monthly",
                    "features": ["reports"]
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Subscribes `user` to `tier_id` and returns the subscription body.
    pub async fn subscribe(&self, user: &str, tier_id: &str) -> Value {
        let response = self
            .user(
                user,
                Method::POST,
                "/api/subscriptions",
                Some(json!({"tier_id": tier_id, "email": format!("{}@example.com", user), "payment_token": "tok_visa"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    pub async fn current(&self, user: &str) -> Response {
        self.user(user, Method::GET, "/api/subscriptions/current", None).await
    }

    /// Posts a signed mock-dialect webhook.
    pub async fn webhook(&self, gateway: &MockGateway, event_id: &str, event_type: &str, subscription_ref: &str) -> Response {
        let body = MockGateway::event_body(event_id, event_type, subscription_ref, self.clock_now());
        self.deliver(&gateway.sign(&body), body).await
    }

    pub async fn deliver(&self, signature: &WebhookHeaders, body: Vec<u8>) -> Response {
        let sig = signature.get("Mock-Signature").unwrap_or_default().to_string();
        self.send(Method::POST, "/webhooks/card-network", &[("mock-signature", sig.as_str())], Some(body))
            .await
    }

    pub fn clock_now(&self) -> Timestamp {
        use subscription_billing::domain::foundation::Clock;
        self.clock.now()
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(chrono::Duration::days(days));
    }
}

pub fn provider_request(kind: ProviderKind, priority: u32) -> Value {
    json!({
        "kind": kind.as_str(),
        "display_name": format!("{} #{}", kind, priority),
        "environment": "sandbox",
        "priority": priority,
        "supported_currencies": ["USD", "EUR"],
        "supported_methods": ["card", "wallet"],
        "credentials": {"api_key": format!("sk_test_{}", priority), "webhook_secret": "whsec_test"}
    })
}
