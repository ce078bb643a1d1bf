//! Composition root.
//!
//! Wires repositories, gateways and application services into the shared
//! HTTP state and the background scheduler. The binary uses it with
//! PostgreSQL or in-memory storage; integration tests use it with
//! in-memory storage and mock gateways.

use std::sync::Arc;

use sqlx::PgPool;

use crate::adapters::http::AppState;
use crate::adapters::memory::{
    InMemoryAuditLog, InMemoryConfigurationRepository, InMemoryPaymentAttemptRepository,
    InMemorySubscriptionRepository, InMemoryTierRepository, InMemoryWebhookEventRepository,
};
use crate::adapters::postgres::{
    PostgresAuditLog, PostgresConfigurationRepository, PostgresPaymentAttemptRepository,
    PostgresSubscriptionRepository, PostgresTierRepository, PostgresWebhookEventRepository,
};
use crate::application::{
    BillingScheduler, Charger, ConfigurationStore, HealthRegistry, ProviderRouter, SubscriptionLocks,
    SubscriptionStateMachine, WebhookIngestor,
};
use crate::config::BillingConfig;
use crate::domain::billing::BillingError;
use crate::domain::foundation::Clock;
use crate::ports::{
    AdminTokenValidator, AuditLog, ConfigurationRepository, CredentialCipher, GatewayRegistry,
    OperatorAlerter, PaymentAttemptRepository, SubscriptionRepository, TierRepository, UserNotifier,
    WebhookEventRepository,
};

/// Every storage port, backed by one implementation family.
#[derive(Clone)]
pub struct Repositories {
    pub configuration: Arc<dyn ConfigurationRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub tiers: Arc<dyn TierRepository>,
    pub attempts: Arc<dyn PaymentAttemptRepository>,
    pub events: Arc<dyn WebhookEventRepository>,
    pub audit: Arc<dyn AuditLog>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            configuration: Arc::new(InMemoryConfigurationRepository::new()),
            subscriptions: Arc::new(InMemorySubscriptionRepository::new()),
            tiers: Arc::new(InMemoryTierRepository::new()),
            attempts: Arc::new(InMemoryPaymentAttemptRepository::new()),
            events: Arc::new(InMemoryWebhookEventRepository::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            configuration: Arc::new(PostgresConfigurationRepository::new(pool.clone())),
            subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
            tiers: Arc::new(PostgresTierRepository::new(pool.clone())),
            attempts: Arc::new(PostgresPaymentAttemptRepository::new(pool.clone())),
            events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
            audit: Arc::new(PostgresAuditLog::new(pool)),
        }
    }
}

/// Outside-world collaborators that differ between production and tests.
#[derive(Clone)]
pub struct Collaborators {
    pub gateways: Arc<dyn GatewayRegistry>,
    pub cipher: Arc<dyn CredentialCipher>,
    pub clock: Arc<dyn Clock>,
    pub admin_validator: Arc<dyn AdminTokenValidator>,
    pub notifier: Arc<dyn UserNotifier>,
    pub alerter: Arc<dyn OperatorAlerter>,
}

/// The assembled engine.
pub struct BillingApp {
    pub state: AppState,
    pub scheduler: BillingScheduler,
}

impl BillingApp {
    /// Loads the current configuration and builds every service on top of it.
    pub async fn assemble(
        repos: Repositories,
        outside: Collaborators,
        billing: &BillingConfig,
    ) -> Result<Self, BillingError> {
        let store = Arc::new(
            ConfigurationStore::load(
                repos.configuration.clone(),
                repos.audit.clone(),
                outside.cipher.clone(),
                outside.gateways.clone(),
                repos.subscriptions.clone(),
                outside.clock.clone(),
            )
            .await?,
        );

        let machine = Arc::new(SubscriptionStateMachine::new(
            repos.subscriptions.clone(),
            repos.tiers.clone(),
            store.subscribe(),
            Arc::new(SubscriptionLocks::new()),
            outside.notifier.clone(),
            outside.clock.clone(),
            billing.lock_retry_attempts,
        ));
        let router = Arc::new(ProviderRouter::new(
            store.subscribe(),
            outside.gateways.clone(),
            Arc::new(HealthRegistry::new(billing.unhealthy_after_failures)),
            outside.alerter.clone(),
        )
        .with_history(repos.configuration.clone()));
        let charger = Arc::new(Charger::new(
            router.clone(),
            repos.attempts.clone(),
            outside.clock.clone(),
        ));
        let ingestor = Arc::new(WebhookIngestor::new(
            store.subscribe(),
            outside.gateways.clone(),
            repos.events.clone(),
            machine.clone(),
            outside.alerter.clone(),
            outside.clock.clone(),
            billing.max_webhook_attempts,
        ));

        let scheduler = BillingScheduler::new(
            store.clone(),
            machine.clone(),
            router.clone(),
            repos.subscriptions.clone(),
            charger.clone(),
            repos.events.clone(),
            ingestor.clone(),
            outside.alerter.clone(),
            outside.clock.clone(),
            billing.scheduler_config(),
        );

        let state = AppState {
            store,
            router,
            machine,
            ingestor,
            charger,
            subscriptions: repos.subscriptions,
            tiers: repos.tiers,
            attempts: repos.attempts,
            audit: repos.audit,
            clock: outside.clock,
            admin_validator: outside.admin_validator,
        };

        Ok(Self { state, scheduler })
    }
}
