//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `ProviderGateway` - One capability interface over every payment provider
//! - `GatewayRegistry` - Builds gateways from configuration versions
//! - `CredentialCipher` - Encryption of stored provider credentials
//!
//! ## Persistence Ports
//!
//! - `ConfigurationRepository` - Versioned configuration snapshots
//! - `SubscriptionRepository` - UserSubscription aggregates
//! - `TierRepository` - Tier catalog
//! - `PaymentAttemptRepository` - Append-only charge log
//! - `WebhookEventRepository` - Webhook idempotency and processing state
//! - `AuditLog` - Administrative audit trail
//!
//! ## Outbound
//!
//! - `UserNotifier` / `OperatorAlerter` - Fire-and-forget notifications
//! - `AdminTokenValidator` - Admin API authentication

mod admin_token_validator;
mod audit_log;
mod configuration_repository;
mod credential_cipher;
mod notifier;
mod payment_attempt_repository;
mod provider_gateway;
mod subscription_repository;
mod tier_repository;
mod webhook_event_repository;

pub use admin_token_validator::{AdminAuthError, AdminIdentity, AdminTokenValidator};
pub use audit_log::{AuditEntry, AuditLog};
pub use configuration_repository::ConfigurationRepository;
pub use credential_cipher::CredentialCipher;
pub use notifier::{OperatorAlert, OperatorAlerter, StatusNotification, UserNotifier};
pub use payment_attempt_repository::PaymentAttemptRepository;
pub use provider_gateway::{
    ChargeReceipt, ConnectivityReport, CustomerRef, ExternalRef, GatewayError, GatewayErrorKind,
    GatewayRegistry, ProviderGateway, RefundReceipt, WebhookHeaders,
};
pub use subscription_repository::SubscriptionRepository;
pub use tier_repository::TierRepository;
pub use webhook_event_repository::{SaveResult, WebhookEventRepository};
