//! In-memory wiring shared by the application tests.

use std::sync::Arc;

use tokio::sync::watch;

use crate::adapters::gateways::{MockGateway, StaticGatewayRegistry};
use crate::adapters::memory::{
    InMemoryPaymentAttemptRepository, InMemorySubscriptionRepository, InMemoryTierRepository,
    InMemoryWebhookEventRepository,
};
use crate::adapters::notify::RecordingNotifier;
use crate::domain::billing::provider_fixtures::provider;
use crate::domain::billing::subscription_fixtures::{t0, tier};
use crate::domain::billing::{
    ConfigSnapshot, GlobalBillingPolicy, NewSubscription, ProviderConfiguration, ProviderKind,
    SubscriptionTier, UserSubscription,
};
use crate::domain::foundation::{Clock, ManualClock, UserId};
use crate::ports::{SubscriptionRepository, TierRepository};

use super::health::HealthRegistry;
use super::locks::SubscriptionLocks;
use super::router::ProviderRouter;
use super::state_machine::SubscriptionStateMachine;

pub(crate) struct TestBed {
    pub clock: ManualClock,
    pub config: watch::Sender<Arc<ConfigSnapshot>>,
    pub gateways: Arc<StaticGatewayRegistry>,
    pub subscriptions: Arc<InMemorySubscriptionRepository>,
    pub tiers: Arc<InMemoryTierRepository>,
    pub attempts: Arc<InMemoryPaymentAttemptRepository>,
    pub events: Arc<InMemoryWebhookEventRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub health: Arc<HealthRegistry>,
    pub machine: Arc<SubscriptionStateMachine>,
    pub router: Arc<ProviderRouter>,
    pub tier: SubscriptionTier,
}

impl TestBed {
    pub async fn new(policy: GlobalBillingPolicy) -> Self {
        let clock = ManualClock::starting_at(t0());
        let (config, _) = watch::channel(Arc::new(ConfigSnapshot::empty(t0()).with_policy(policy, t0())));
        let gateways = Arc::new(StaticGatewayRegistry::new());
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let tiers = Arc::new(InMemoryTierRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let health = Arc::new(HealthRegistry::new(2));
        let tier = tier();
        tiers.save(&tier).await.unwrap();

        let machine = Arc::new(SubscriptionStateMachine::new(
            subscriptions.clone(),
            tiers.clone(),
            config.subscribe(),
            Arc::new(SubscriptionLocks::new()),
            notifier.clone(),
            Arc::new(clock.clone()),
            3,
        ));
        let router = Arc::new(ProviderRouter::new(
            config.subscribe(),
            gateways.clone(),
            health.clone(),
            notifier.clone(),
        ));

        Self {
            clock,
            config,
            gateways,
            subscriptions,
            tiers,
            attempts: Arc::new(InMemoryPaymentAttemptRepository::new()),
            events: Arc::new(InMemoryWebhookEventRepository::new()),
            notifier,
            health,
            machine,
            router,
            tier,
        }
    }

    pub async fn without_trial() -> Self {
        Self::new(GlobalBillingPolicy {
            trial_enabled: false,
            ..GlobalBillingPolicy::default()
        })
        .await
    }

    /// Configures a provider backed by a fresh mock gateway.
    pub fn add_provider(&self, kind: ProviderKind, priority: u32) -> (ProviderConfiguration, MockGateway) {
        let config = provider(kind, priority);
        let gateway = MockGateway::new(kind);
        self.gateways.register(config.id, Arc::new(gateway.clone()));
        let now = self.clock.now();
        let next = self.config.borrow().with_provider(config.clone(), now);
        self.config.send_replace(Arc::new(next));
        (config, gateway)
    }

    /// Stores a fresh subscription on `provider`, starting now.
    pub async fn subscribe(&self, provider: &ProviderConfiguration, external_ref: &str) -> UserSubscription {
        let policy = self.config.borrow().policy.clone();
        let sub = UserSubscription::start(
            NewSubscription {
                user_id: UserId::new(format!("user-{}", external_ref)).unwrap(),
                tier_id: self.tier.id,
                provider_id: provider.id,
                provider_kind: provider.kind,
                external_ref: external_ref.to_string(),
            },
            &self.tier,
            &policy,
            self.clock.now(),
        )
        .unwrap();
        self.subscriptions.insert(&sub).await.unwrap();
        sub
    }

    pub async fn reload(&self, sub: &UserSubscription) -> UserSubscription {
        self.subscriptions.find_by_id(sub.id).await.unwrap().unwrap()
    }
}
