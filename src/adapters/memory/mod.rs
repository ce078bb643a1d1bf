//! In-memory repository implementations.
//!
//! Used by tests and when the service runs without a database. State lives
//! behind `tokio::sync::RwLock`, so readers never block each other.

mod audit_log;
mod configuration_repository;
mod payment_attempt_repository;
mod subscription_repository;
mod tier_repository;
mod webhook_event_repository;

pub use audit_log::InMemoryAuditLog;
pub use configuration_repository::InMemoryConfigurationRepository;
pub use payment_attempt_repository::InMemoryPaymentAttemptRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use tier_repository::InMemoryTierRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
