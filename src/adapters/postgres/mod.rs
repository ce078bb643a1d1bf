//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - Subscriptions with optimistic versioning
//! - `PostgresWebhookEventRepository` - Idempotent webhook event records
//! - `PostgresPaymentAttemptRepository` - Append-only charge log
//! - `PostgresConfigurationRepository` - Versioned configuration snapshots
//! - `PostgresTierRepository` - Subscription tiers
//! - `PostgresAuditLog` - Administrative audit trail

mod audit_log;
mod configuration_repository;
mod payment_attempt_repository;
mod subscription_repository;
mod tier_repository;
mod webhook_event_repository;

pub use audit_log::PostgresAuditLog;
pub use configuration_repository::PostgresConfigurationRepository;
pub use payment_attempt_repository::PostgresPaymentAttemptRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use tier_repository::PostgresTierRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::billing::BillingError;

/// Wraps a sqlx failure as a storage error with the failed operation named.
pub(crate) fn db_error(operation: &str, err: sqlx::Error) -> BillingError {
    BillingError::Storage(format!("Failed to {}: {}", operation, err))
}

pub(crate) fn is_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
