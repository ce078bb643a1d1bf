//! Shared state for every route.

use std::sync::Arc;

use crate::application::handlers::{
    CancelSubscriptionHandler, ChangeTierHandler, CreateSubscriptionHandler, CreateTierHandler,
    DeactivateTierHandler, GetBillingAnalyticsHandler, GetSubscriptionHandler, ListTiersHandler,
    ReactivateSubscriptionHandler, RefundPaymentHandler, UpdateTierHandler,
};
use crate::application::{
    Charger, ConfigurationStore, ProviderRouter, SubscriptionStateMachine, WebhookIngestor,
};
use crate::domain::foundation::Clock;
use crate::ports::{
    AdminTokenValidator, AuditLog, PaymentAttemptRepository, SubscriptionRepository, TierRepository,
};

/// Shared application state.
///
/// Cloned per request; every dependency is behind an `Arc`. Command
/// handlers are built on demand from it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigurationStore>,
    pub router: Arc<ProviderRouter>,
    pub machine: Arc<SubscriptionStateMachine>,
    pub ingestor: Arc<WebhookIngestor>,
    pub charger: Arc<Charger>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub tiers: Arc<dyn TierRepository>,
    pub attempts: Arc<dyn PaymentAttemptRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
    pub admin_validator: Arc<dyn AdminTokenValidator>,
}

impl AppState {
    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.tiers.clone(),
            self.router.clone(),
            self.machine.clone(),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.machine.clone(), self.router.clone())
    }

    pub fn change_tier_handler(&self) -> ChangeTierHandler {
        ChangeTierHandler::new(self.machine.clone(), self.tiers.clone(), self.router.clone())
    }

    pub fn reactivate_handler(&self) -> ReactivateSubscriptionHandler {
        ReactivateSubscriptionHandler::new(self.machine.clone(), self.charger.clone())
    }

    pub fn refund_handler(&self) -> RefundPaymentHandler {
        RefundPaymentHandler::new(self.attempts.clone(), self.router.clone())
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.subscriptions.clone(), self.tiers.clone(), self.attempts.clone())
    }

    pub fn list_tiers_handler(&self) -> ListTiersHandler {
        ListTiersHandler::new(self.tiers.clone())
    }

    pub fn create_tier_handler(&self) -> CreateTierHandler {
        CreateTierHandler::new(self.tiers.clone(), self.audit.clone(), self.clock.clone())
    }

    pub fn update_tier_handler(&self) -> UpdateTierHandler {
        UpdateTierHandler::new(
            self.tiers.clone(),
            self.subscriptions.clone(),
            self.audit.clone(),
            self.clock.clone(),
        )
    }

    pub fn deactivate_tier_handler(&self) -> DeactivateTierHandler {
        DeactivateTierHandler::new(self.tiers.clone(), self.audit.clone(), self.clock.clone())
    }

    pub fn analytics_handler(&self) -> GetBillingAnalyticsHandler {
        GetBillingAnalyticsHandler::new(
            self.subscriptions.clone(),
            self.tiers.clone(),
            self.attempts.clone(),
            self.store.subscribe(),
            self.clock.clone(),
        )
    }
}
