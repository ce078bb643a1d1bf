//! ProviderRouter - Provider selection and failover.
//!
//! Candidates are the enabled providers supporting the requested currency
//! and method. Healthy ones come first in priority order, unhealthy ones
//! after them as a last resort, so a bad health reading never blocks
//! routing outright.
//!
//! # Failover
//!
//! - Transient error or timeout: counted against the provider's health,
//!   then the next candidate is tried
//! - Config error (gateway cannot be built): next candidate
//! - Permanent error: returned at once, no further candidates
//! - All candidates exhausted: `ProviderUnavailable` plus an operator alert

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::billing::{BillingError, ConfigSnapshot, PaymentMethod, ProviderConfiguration};
use crate::domain::foundation::{Currency, ProviderId};
use crate::ports::{
    ConfigurationRepository, GatewayError, GatewayErrorKind, GatewayRegistry, OperatorAlert, OperatorAlerter,
    ProviderGateway,
};

use super::health::HealthRegistry;

/// A result together with the provider version that produced it.
#[derive(Debug, Clone)]
pub struct Routed<T> {
    pub provider: ProviderConfiguration,
    pub value: T,
}

/// Whether a pinned call may be repeated on the same provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// One attempt. Used for charges, which must not be doubled.
    Never,
    /// Up to the provider's `max_retries` extra attempts on transient errors.
    Transient,
}

pub struct ProviderRouter {
    config: watch::Receiver<Arc<ConfigSnapshot>>,
    gateways: Arc<dyn GatewayRegistry>,
    health: Arc<HealthRegistry>,
    alerter: Arc<dyn OperatorAlerter>,
    history: Option<Arc<dyn ConfigurationRepository>>,
}

impl ProviderRouter {
    pub fn new(
        config: watch::Receiver<Arc<ConfigSnapshot>>,
        gateways: Arc<dyn GatewayRegistry>,
        health: Arc<HealthRegistry>,
        alerter: Arc<dyn OperatorAlerter>,
    ) -> Self {
        Self {
            config,
            gateways,
            health,
            alerter,
            history: None,
        }
    }

    /// Lets pinned calls reach providers removed from the live snapshot
    /// through their last stored version.
    pub fn with_history(mut self, history: Arc<dyn ConfigurationRepository>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Routing order for a currency and method.
    pub fn candidates(&self, currency: &Currency, method: PaymentMethod) -> Vec<ProviderConfiguration> {
        let snapshot = self.config.borrow().clone();
        let (healthy, unhealthy): (Vec<_>, Vec<_>) = snapshot
            .active_providers()
            .into_iter()
            .filter(|p| p.supports(currency, method))
            .partition(|p| self.health.is_healthy(p.id));
        healthy.into_iter().chain(unhealthy).collect()
    }

    /// First provider that would be tried.
    pub fn select_provider(
        &self,
        currency: &Currency,
        method: PaymentMethod,
    ) -> Result<ProviderConfiguration, BillingError> {
        self.candidates(currency, method)
            .into_iter()
            .next()
            .ok_or_else(|| {
                BillingError::unavailable(format!("no enabled provider supports {} via {:?}", currency, method))
            })
    }

    /// Runs `op` against candidates in routing order until one answers.
    pub async fn execute_with_failover<T, F, Fut>(
        &self,
        currency: &Currency,
        method: PaymentMethod,
        operation: &str,
        op: F,
    ) -> Result<Routed<T>, BillingError>
    where
        F: Fn(Arc<dyn ProviderGateway>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let candidates = self.candidates(currency, method);
        if candidates.is_empty() {
            let reason = format!("no enabled provider supports {} via {:?}", currency, method);
            self.alert_unavailable(operation, &reason).await;
            return Err(BillingError::unavailable(reason));
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for config in candidates {
            let gateway = match self.gateways.gateway_for(&config) {
                Ok(gateway) => gateway,
                Err(e) => {
                    tracing::warn!(provider_id = %config.id, operation, error = %e, "skipping misconfigured provider");
                    failures.push(format!("{}: {}", config.id, e));
                    continue;
                }
            };

            match self.call(&config, &gateway, operation, &op).await {
                Ok(value) => {
                    return Ok(Routed {
                        provider: config,
                        value,
                    })
                }
                Err(e) if e.kind == GatewayErrorKind::Permanent => {
                    return Err(e.into_billing(config.id));
                }
                Err(e) => {
                    tracing::warn!(provider_id = %config.id, operation, error = %e, "failing over");
                    failures.push(format!("{}: {}", config.id, e));
                }
            }
        }

        let reason = format!("all providers failed: {}", failures.join("; "));
        self.alert_unavailable(operation, &reason).await;
        Err(BillingError::unavailable(reason))
    }

    /// Runs `op` against one specific provider.
    ///
    /// Operations on an existing subscription belong to the provider that
    /// owns it, so there is no failover. A disabled provider still serves
    /// its existing subscriptions.
    pub async fn execute_on<T, F, Fut>(
        &self,
        provider_id: ProviderId,
        operation: &str,
        repeat: Repeat,
        op: F,
    ) -> Result<Routed<T>, BillingError>
    where
        F: Fn(Arc<dyn ProviderGateway>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let live = self.config.borrow().provider(provider_id).cloned();
        let config = match live {
            Some(config) => config,
            None => self.removed_provider(provider_id).await?,
        };
        let gateway = self.gateways.gateway_for(&config)?;

        let attempts = match repeat {
            Repeat::Never => 1,
            Repeat::Transient => config.max_retries + 1,
        };
        let mut attempt = 1;
        loop {
            match self.call(&config, &gateway, operation, &op).await {
                Ok(value) => {
                    return Ok(Routed {
                        provider: config,
                        value,
                    })
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::debug!(provider_id = %provider_id, operation, attempt, error = %e, "repeating call");
                    attempt += 1;
                }
                Err(e) => return Err(e.into_billing(provider_id)),
            }
        }
    }

    async fn removed_provider(&self, id: ProviderId) -> Result<ProviderConfiguration, BillingError> {
        let history = self.history.as_ref().ok_or(BillingError::ProviderNotFound(id))?;
        let last = history
            .provider_history(id)
            .await?
            .pop()
            .ok_or(BillingError::ProviderNotFound(id))?;
        tracing::warn!(provider_id = %id, version = last.version, "calling removed provider via its last stored version");
        Ok(last)
    }

    async fn call<T, F, Fut>(
        &self,
        config: &ProviderConfiguration,
        gateway: &Arc<dyn ProviderGateway>,
        operation: &str,
        op: &F,
    ) -> Result<T, GatewayError>
    where
        F: Fn(Arc<dyn ProviderGateway>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let result = match tokio::time::timeout(config.timeout(), op(gateway.clone())).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(config.timeout_secs)),
        };

        match &result {
            Ok(_) => self.health.record_success(config.id),
            // The provider answered; a refusal says nothing about its health.
            Err(e) if e.kind == GatewayErrorKind::Permanent => self.health.record_success(config.id),
            Err(e) if e.is_transient() => {
                if self.health.record_failure(config.id, &e.message) {
                    tracing::warn!(provider_id = %config.id, operation, "provider marked unhealthy");
                    self.alert(OperatorAlert::ProviderUnhealthy {
                        provider: format!("{} ({})", config.display_name, config.id),
                        reason: e.message.clone(),
                    })
                    .await;
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn alert_unavailable(&self, operation: &str, reason: &str) {
        tracing::error!(operation, reason, "no provider could serve the request");
        self.alert(OperatorAlert::AllProvidersUnavailable {
            operation: operation.to_string(),
            reason: reason.to_string(),
        })
        .await;
    }

    async fn alert(&self, alert: OperatorAlert) {
        if let Err(e) = self.alerter.alert(alert).await {
            tracing::warn!(error = %e, "operator alert not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::adapters::gateways::{MockGateway, StaticGatewayRegistry};
    use crate::adapters::memory::InMemoryConfigurationRepository;
    use crate::adapters::notify::RecordingNotifier;
    use crate::domain::billing::provider_fixtures::provider;
    use crate::domain::billing::ProviderKind;
    use crate::domain::foundation::Timestamp;
    use crate::ports::ChargeReceipt;
    use crate::domain::foundation::Money;

    struct Harness {
        router: ProviderRouter,
        alerts: Arc<RecordingNotifier>,
        _tx: watch::Sender<Arc<ConfigSnapshot>>,
    }

    fn harness(providers: Vec<(ProviderConfiguration, MockGateway)>) -> Harness {
        let registry = Arc::new(StaticGatewayRegistry::new());
        let mut snapshot = ConfigSnapshot::empty(Timestamp::from_unix_secs(1_700_000_000).unwrap());
        for (config, gateway) in providers {
            registry.register(config.id, Arc::new(gateway));
            snapshot = snapshot.with_provider(config, snapshot.created_at);
        }
        let (tx, rx) = watch::channel(Arc::new(snapshot));
        let alerts = Arc::new(RecordingNotifier::new());
        Harness {
            router: ProviderRouter::new(rx, registry, Arc::new(HealthRegistry::new(2)), alerts.clone()),
            alerts,
            _tx: tx,
        }
    }

    fn usd() -> Currency {
        Currency::usd()
    }

    async fn charge(router: &ProviderRouter) -> Result<Routed<ChargeReceipt>, BillingError> {
        let amount = Money::new(1000, usd());
        router
            .execute_with_failover(&usd(), PaymentMethod::Card, "charge", |gw| {
                let amount = amount.clone();
                async move { gw.charge("sub_1", &amount).await }
            })
            .await
    }

    async fn cancel_on(router: &ProviderRouter, id: ProviderId) -> Result<Routed<()>, BillingError> {
        router
            .execute_on(id, "cancel_subscription", Repeat::Transient, |gw| async move {
                gw.cancel_subscription("sub_1").await
            })
            .await
    }

    #[tokio::test]
    async fn pinned_call_to_unknown_provider_is_not_found() {
        let removed = provider(ProviderKind::CardNetwork, 1);
        let h = harness(vec![]);

        let err = cancel_on(&h.router, removed.id).await.unwrap_err();

        assert!(matches!(err, BillingError::ProviderNotFound(id) if id == removed.id));
    }

    #[tokio::test]
    async fn pinned_call_reaches_removed_provider_through_history() {
        let removed = provider(ProviderKind::CardNetwork, 1);
        let gateway = MockGateway::new(ProviderKind::CardNetwork);
        let history = Arc::new(InMemoryConfigurationRepository::new());
        let at = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        history
            .append_version(&ConfigSnapshot::empty(at).with_provider(removed.clone(), at))
            .await
            .unwrap();
        let h = harness(vec![]);
        let registry = Arc::new(StaticGatewayRegistry::new());
        registry.register(removed.id, Arc::new(gateway.clone()));
        let router = ProviderRouter::new(
            h._tx.subscribe(),
            registry,
            Arc::new(HealthRegistry::new(2)),
            h.alerts.clone(),
        )
        .with_history(history);

        let routed = cancel_on(&router, removed.id).await.unwrap();

        assert_eq!(routed.provider.id, removed.id);
        assert_eq!(gateway.call_count("cancel_subscription"), 1);
    }

    #[tokio::test]
    async fn lowest_priority_number_is_tried_first() {
        let a = provider(ProviderKind::CardNetwork, 2);
        let b = provider(ProviderKind::Wallet, 1);
        let h = harness(vec![
            (a.clone(), MockGateway::new(ProviderKind::CardNetwork)),
            (b.clone(), MockGateway::new(ProviderKind::Wallet)),
        ]);
        assert_eq!(h.router.select_provider(&usd(), PaymentMethod::Card).unwrap().id, b.id);
    }

    #[tokio::test]
    async fn unsupported_currency_has_no_candidate() {
        let h = harness(vec![(
            provider(ProviderKind::CardNetwork, 1),
            MockGateway::new(ProviderKind::CardNetwork),
        )]);
        let eur = Currency::new("EUR").unwrap();
        assert!(matches!(
            h.router.select_provider(&eur, PaymentMethod::Card),
            Err(BillingError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn transient_error_fails_over_to_next_provider() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let b = provider(ProviderKind::Wallet, 2);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        let gw_b = MockGateway::new(ProviderKind::Wallet);
        gw_a.fail_next("charge", GatewayError::transient("503"));
        let h = harness(vec![(a, gw_a.clone()), (b.clone(), gw_b.clone())]);

        let routed = charge(&h.router).await.unwrap();

        assert_eq!(routed.provider.id, b.id);
        assert_eq!(gw_a.call_count("charge"), 1);
        assert_eq!(gw_b.call_count("charge"), 1);
    }

    #[tokio::test]
    async fn permanent_error_aborts_without_failover() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let b = provider(ProviderKind::Wallet, 2);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        let gw_b = MockGateway::new(ProviderKind::Wallet);
        gw_a.fail_next("charge", GatewayError::permanent("card declined").with_provider_code("card_declined"));
        let h = harness(vec![(a, gw_a), (b, gw_b.clone())]);

        let err = charge(&h.router).await.unwrap_err();

        match err {
            BillingError::ProviderPermanent { code, .. } => assert_eq!(code.as_deref(), Some("card_declined")),
            other => panic!("expected permanent error, got {:?}", other),
        }
        assert_eq!(gw_b.call_count("charge"), 0);
    }

    #[tokio::test]
    async fn exhausted_candidates_alert_and_report_unavailable() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        gw_a.fail_always("charge", GatewayError::transient("down"));
        let h = harness(vec![(a, gw_a)]);

        let err = charge(&h.router).await.unwrap_err();

        assert!(matches!(err, BillingError::ProviderUnavailable { .. }));
        assert!(h
            .alerts
            .alerts()
            .iter()
            .any(|a| matches!(a, OperatorAlert::AllProvidersUnavailable { .. })));
    }

    #[tokio::test]
    async fn unhealthy_provider_is_not_tried_before_a_healthy_one() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let b = provider(ProviderKind::Wallet, 2);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        let gw_b = MockGateway::new(ProviderKind::Wallet);
        let h = harness(vec![(a.clone(), gw_a.clone()), (b.clone(), gw_b)]);
        h.router.health().record_probe(a.id, &crate::ports::ConnectivityReport::failed(5, "down"), Timestamp::now());

        let routed = charge(&h.router).await.unwrap();

        assert_eq!(routed.provider.id, b.id);
        assert_eq!(gw_a.call_count("charge"), 0);
    }

    #[tokio::test]
    async fn repeated_transient_failures_mark_provider_unhealthy() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let b = provider(ProviderKind::Wallet, 2);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        gw_a.fail_always("charge", GatewayError::transient("timeout"));
        let h = harness(vec![(a.clone(), gw_a), (b, MockGateway::new(ProviderKind::Wallet))]);

        charge(&h.router).await.unwrap();
        charge(&h.router).await.unwrap();

        assert!(!h.router.health().is_healthy(a.id));
        assert!(h
            .alerts
            .alerts()
            .iter()
            .any(|a| matches!(a, OperatorAlert::ProviderUnhealthy { .. })));
    }

    #[tokio::test]
    async fn slow_provider_times_out_as_transient() {
        let mut a = provider(ProviderKind::CardNetwork, 1);
        a.timeout_secs = 1;
        let b = provider(ProviderKind::Wallet, 2);
        let gw_a = MockGateway::new(ProviderKind::CardNetwork);
        gw_a.set_delay(Duration::from_secs(5));
        let h = harness(vec![(a, gw_a), (b.clone(), MockGateway::new(ProviderKind::Wallet))]);

        tokio::time::pause();
        let routed = charge(&h.router).await.unwrap();
        assert_eq!(routed.provider.id, b.id);
    }

    #[tokio::test]
    async fn unbuildable_gateway_is_skipped() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let b = provider(ProviderKind::Wallet, 2);
        let h = harness(vec![(b.clone(), MockGateway::new(ProviderKind::Wallet))]);
        // `a` is configured but has no gateway registered.
        let snapshot = h.router.config.borrow().with_provider(a, Timestamp::now());
        h._tx.send_replace(Arc::new(snapshot));

        let routed = charge(&h.router).await.unwrap();
        assert_eq!(routed.provider.id, b.id);
    }

    #[tokio::test]
    async fn pinned_call_ignores_priority_and_disabled_flag() {
        let a = provider(ProviderKind::CardNetwork, 1);
        let mut b = provider(ProviderKind::Wallet, 2);
        b.enabled = false;
        let gw_b = MockGateway::new(ProviderKind::Wallet);
        let h = harness(vec![(a, MockGateway::new(ProviderKind::CardNetwork)), (b.clone(), gw_b.clone())]);

        let routed = h
            .router
            .execute_on(b.id, "cancel", Repeat::Never, |gw| async move {
                gw.cancel_subscription("sub_1").await
            })
            .await
            .unwrap();

        assert_eq!(routed.provider.id, b.id);
        assert_eq!(gw_b.call_count("cancel_subscription"), 1);
    }

    #[tokio::test]
    async fn pinned_call_repeats_transient_failures_when_allowed() {
        let mut a = provider(ProviderKind::CardNetwork, 1);
        a.max_retries = 2;
        let gw = MockGateway::new(ProviderKind::CardNetwork);
        gw.fail_next("refund", GatewayError::transient("502"));
        gw.fail_next("refund", GatewayError::transient("502"));
        let h = harness(vec![(a.clone(), gw.clone())]);
        let amount = Money::new(500, usd());

        let routed = h
            .router
            .execute_on(a.id, "refund", Repeat::Transient, |g| {
                let amount = amount.clone();
                async move { g.refund("ch_1", &amount).await }
            })
            .await
            .unwrap();
        assert!(routed.value.refund_ref.starts_with("mock_re_"));
        assert_eq!(gw.call_count("refund"), 3);

        gw.fail_next("charge", GatewayError::transient("502"));
        let once = h
            .router
            .execute_on(a.id, "charge", Repeat::Never, |g| {
                let amount = amount.clone();
                async move { g.charge("sub_1", &amount).await }
            })
            .await;
        assert!(matches!(once, Err(BillingError::ProviderTransient { .. })));
        assert_eq!(gw.call_count("charge"), 1);
    }
}
