//! BillingScheduler - Time-driven billing duties.
//!
//! One periodic loop with three timers:
//!
//! | Timer    | Work |
//! |----------|------|
//! | tick     | trial ends, grace expiry, payment retries, webhook re-processing, retention |
//! | probe    | connectivity check of every enabled provider |
//! | refresh  | reload configuration written by other processes |
//!
//! ## Graceful Shutdown
//!
//! The loop listens on a watch channel. Work already started finishes;
//! nothing new starts once the signal is seen.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time;

use crate::domain::billing::{
    BillingError, ChargeReason, LifecycleTrigger, SubscriptionStatus, Transition,
};
use crate::domain::foundation::{Clock, ProviderId, SubscriptionId};
use crate::ports::{OperatorAlert, OperatorAlerter, SubscriptionRepository, WebhookEventRepository};

use super::charging::Charger;
use super::configuration_store::ConfigurationStore;
use super::router::ProviderRouter;
use super::state_machine::SubscriptionStateMachine;
use super::webhook_ingestor::{ReprocessReport, WebhookIngestor};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub probe_interval: Duration,
    pub config_refresh_interval: Duration,
    /// Retryable webhook records re-applied per tick.
    pub webhook_batch_size: usize,
    pub webhook_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            probe_interval: Duration::from_secs(300),
            config_refresh_interval: Duration::from_secs(30),
            webhook_batch_size: 100,
            webhook_retention_days: 90,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub trials_converted: usize,
    pub trials_expired: usize,
    /// Trial-end charges that failed transiently and were rescheduled.
    pub trial_charges_deferred: usize,
    pub retries_succeeded: usize,
    pub retries_failed: usize,
    pub suspended: usize,
    /// Subscriptions skipped because of an error; picked up again next tick.
    pub errors: usize,
    pub webhooks: ReprocessReport,
    pub webhooks_purged: u64,
}

/// What happened to one subscription during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    TrialConverted,
    TrialExpired,
    TrialChargeDeferred,
    RetrySucceeded,
    RetryFailed,
    Suspended,
    Nothing,
}

pub struct BillingScheduler {
    store: Arc<ConfigurationStore>,
    machine: Arc<SubscriptionStateMachine>,
    router: Arc<ProviderRouter>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    charger: Arc<Charger>,
    events: Arc<dyn WebhookEventRepository>,
    ingestor: Arc<WebhookIngestor>,
    alerter: Arc<dyn OperatorAlerter>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl BillingScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ConfigurationStore>,
        machine: Arc<SubscriptionStateMachine>,
        router: Arc<ProviderRouter>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        charger: Arc<Charger>,
        events: Arc<dyn WebhookEventRepository>,
        ingestor: Arc<WebhookIngestor>,
        alerter: Arc<dyn OperatorAlerter>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            machine,
            router,
            subscriptions,
            charger,
            events,
            ingestor,
            alerter,
            clock,
            config,
        }
    }

    /// Runs until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = time::interval(self.config.tick_interval);
        let mut probe = time::interval(self.config.probe_interval);
        let mut refresh = time::interval(self.config.config_refresh_interval);
        for timer in [&mut tick, &mut probe, &mut refresh] {
            timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        }
        tracing::info!(config = ?self.config, "billing scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("billing scheduler stopping");
                        return;
                    }
                }

                _ = refresh.tick() => {
                    if let Err(e) = self.store.reload().await {
                        tracing::warn!(error = %e, "configuration reload failed");
                    }
                }

                _ = probe.tick() => {
                    self.probe_providers().await;
                }

                _ = tick.tick() => {
                    match self.tick_once().await {
                        Ok(report) if report != TickReport::default() => {
                            tracing::info!(?report, "billing tick finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "billing tick failed"),
                    }
                }
            }
        }
    }

    /// One pass over every time-based duty.
    pub async fn tick_once(&self) -> Result<TickReport, BillingError> {
        let mut report = TickReport::default();
        let now = self.clock.now();

        for sub in self.subscriptions.find_needing_attention(now).await? {
            match self.handle_due(sub.id).await {
                Ok(Handled::TrialConverted) => report.trials_converted += 1,
                Ok(Handled::TrialExpired) => report.trials_expired += 1,
                Ok(Handled::TrialChargeDeferred) => report.trial_charges_deferred += 1,
                Ok(Handled::RetrySucceeded) => report.retries_succeeded += 1,
                Ok(Handled::RetryFailed) => report.retries_failed += 1,
                Ok(Handled::Suspended) => report.suspended += 1,
                Ok(Handled::Nothing) => {}
                Err(e) => {
                    tracing::warn!(subscription_id = %sub.id, error = %e, "subscription skipped this tick");
                    report.errors += 1;
                }
            }
        }

        report.webhooks = self.ingestor.reprocess_retryable(self.config.webhook_batch_size).await?;

        let cutoff = now.minus_days(i64::from(self.config.webhook_retention_days));
        report.webhooks_purged = self.events.delete_final_before(cutoff).await?;

        self.machine.locks().prune();
        Ok(report)
    }

    /// Probes every enabled provider concurrently and updates health.
    ///
    /// Returns the providers that failed their probe.
    pub async fn probe_providers(&self) -> Vec<ProviderId> {
        let snapshot = self.store.snapshot();
        let known: Vec<ProviderId> = snapshot.providers.iter().map(|p| p.id).collect();
        self.router.health().retain(&known);

        let providers = snapshot.active_providers();
        let results = join_all(providers.iter().map(|p| self.store.test_connectivity(p.id))).await;

        let mut failed = Vec::new();
        for (provider, result) in providers.iter().zip(results) {
            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(provider_id = %provider.id, error = %e, "probe could not run");
                    continue;
                }
            };
            let was_healthy = self.router.health().is_healthy(provider.id);
            let flipped = self.router.health().record_probe(provider.id, &report, self.clock.now());
            if !report.success {
                failed.push(provider.id);
            }
            if flipped {
                tracing::warn!(provider_id = %provider.id, diagnostic = %report.diagnostic, "provider failed its probe");
                let alert = OperatorAlert::ProviderUnhealthy {
                    provider: format!("{} ({})", provider.display_name, provider.id),
                    reason: report.diagnostic.clone(),
                };
                if let Err(e) = self.alerter.alert(alert).await {
                    tracing::warn!(error = %e, "operator alert not delivered");
                }
            } else if !was_healthy && report.success {
                tracing::info!(provider_id = %provider.id, latency_ms = report.latency_ms, "provider recovered");
            }
        }
        failed
    }

    async fn handle_due(&self, id: SubscriptionId) -> Result<Handled, BillingError> {
        let locked = self.machine.lock(id).await;
        let (sub, tier) = locked.load().await?;
        let now = self.clock.now();

        if sub.is_trial_charge_due(now) {
            if !self.machine.policy().auto_bill_outstanding {
                locked.mutate(|s, ctx| s.apply(LifecycleTrigger::TrialEnded, ctx)).await?;
                return Ok(Handled::TrialExpired);
            }
            let outcome = self
                .charger
                .charge(&sub, &tier, ChargeReason::TrialConversion, sub.retry_count + 1)
                .await;
            if outcome.succeeded() {
                locked
                    .mutate(|s, ctx| s.apply(LifecycleTrigger::PaymentSucceeded, ctx))
                    .await?;
                return Ok(Handled::TrialConverted);
            }
            if outcome.failed_transiently() {
                let (after, _) = locked.mutate(|s, ctx| s.record_failed_trial_charge(ctx)).await?;
                return Ok(if after.status == SubscriptionStatus::Expired {
                    Handled::TrialExpired
                } else {
                    Handled::TrialChargeDeferred
                });
            }
            locked.mutate(|s, ctx| s.apply(LifecycleTrigger::TrialEnded, ctx)).await?;
            return Ok(Handled::TrialExpired);
        }

        // Grace is over regardless of how many retries remain.
        if sub.is_grace_expired(now) {
            locked.mutate(|s, ctx| s.apply(LifecycleTrigger::GraceExpired, ctx)).await?;
            return Ok(Handled::Suspended);
        }

        if sub.is_retry_due(now) {
            let attempt_number = sub.retry_count + 1;
            let outcome = self
                .charger
                .charge(&sub, &tier, ChargeReason::ScheduledRetry, attempt_number)
                .await;
            if outcome.succeeded() {
                locked
                    .mutate(|s, ctx| s.apply(LifecycleTrigger::PaymentSucceeded, ctx))
                    .await?;
                return Ok(Handled::RetrySucceeded);
            }
            let (_, transition) = locked.mutate(|s, ctx| s.record_failed_retry(ctx)).await?;
            return Ok(match transition {
                Transition::Changed {
                    to: SubscriptionStatus::Suspended,
                    ..
                } => Handled::Suspended,
                _ => Handled::RetryFailed,
            });
        }

        Ok(Handled::Nothing)
    }
}
