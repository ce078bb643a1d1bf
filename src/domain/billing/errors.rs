//! Billing error taxonomy.
//!
//! Every failure the engine can surface is one of these variants. The
//! classification (`is_retryable`) drives failover, webhook re-delivery and
//! the HTTP status mapping.

use thiserror::Error;

use crate::domain::foundation::{
    ErrorCode, ProviderId, SubscriptionId, TierId, UserId, ValidationError,
};

use super::{LifecycleTrigger, ProviderKind, SubscriptionStatus};

/// Errors produced by the billing engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Malformed or missing provider configuration/credential.
    ///
    /// Fatal to that provider only, never to the process.
    #[error("Provider configuration invalid{}: {reason}", provider_suffix(.provider))]
    ConfigInvalid {
        provider: Option<ProviderId>,
        reason: String,
    },

    #[error("Webhook signature rejected for {kind}: {reason}")]
    SignatureInvalid { kind: ProviderKind, reason: String },

    #[error("Webhook payload malformed: {0}")]
    MalformedPayload(String),

    /// The event was already applied; callers treat this as success.
    #[error("Event {event_id} already applied")]
    DuplicateEvent { event_id: String },

    #[error("Provider {provider} transient failure: {message}")]
    ProviderTransient {
        provider: ProviderId,
        message: String,
    },

    #[error("Provider {provider} rejected the request: {message}")]
    ProviderPermanent {
        provider: ProviderId,
        code: Option<String>,
        message: String,
    },

    #[error("No payment provider available: {reason}")]
    ProviderUnavailable { reason: String },

    #[error("Provider not found: {0}")]
    ProviderNotFound(ProviderId),

    #[error("Tier not found: {0}")]
    TierNotFound(TierId),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Payment attempt not found: {0}")]
    PaymentNotFound(String),

    #[error("User {0} already has a live subscription")]
    ActiveSubscriptionExists(UserId),

    #[error("Cannot apply {trigger:?} to a {from:?} subscription")]
    InvalidTransition {
        from: SubscriptionStatus,
        trigger: LifecycleTrigger,
    },

    /// Another writer changed the subscription first.
    #[error("Subscription {0} was modified concurrently")]
    ConcurrentModification(SubscriptionId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Audit log unavailable: {0}")]
    AuditUnavailable(String),
}

fn provider_suffix(provider: &Option<ProviderId>) -> String {
    provider
        .map(|id| format!(" for provider {}", id))
        .unwrap_or_default()
}

impl BillingError {
    pub fn config_invalid(provider: Option<ProviderId>, reason: impl Into<String>) -> Self {
        BillingError::ConfigInvalid {
            provider,
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        BillingError::ProviderUnavailable {
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        BillingError::Storage(err.to_string())
    }

    /// Returns the API error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::ConfigInvalid { .. } => ErrorCode::ConfigInvalid,
            BillingError::SignatureInvalid { .. } => ErrorCode::SignatureInvalid,
            BillingError::MalformedPayload(_) => ErrorCode::MalformedPayload,
            BillingError::DuplicateEvent { .. } => ErrorCode::DuplicateEvent,
            BillingError::ProviderTransient { .. } => ErrorCode::ProviderTransientError,
            BillingError::ProviderPermanent { .. } => ErrorCode::ProviderPermanentError,
            BillingError::ProviderUnavailable { .. } => ErrorCode::ProviderUnavailable,
            BillingError::ProviderNotFound(_) => ErrorCode::ProviderNotFound,
            BillingError::TierNotFound(_) => ErrorCode::TierNotFound,
            BillingError::SubscriptionNotFound(_) => ErrorCode::SubscriptionNotFound,
            BillingError::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            BillingError::ActiveSubscriptionExists(_) => ErrorCode::ActiveSubscriptionExists,
            BillingError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            BillingError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            BillingError::Validation(_) => ErrorCode::ValidationFailed,
            BillingError::Storage(_) => ErrorCode::StorageError,
            BillingError::AuditUnavailable(_) => ErrorCode::AuditUnavailable,
        }
    }

    /// Returns true if repeating the operation later may succeed.
    ///
    /// Transient provider failures, lock contention and storage hiccups are
    /// retryable; everything describing bad input or a definitive provider
    /// answer is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ProviderTransient { .. }
                | BillingError::ConcurrentModification(_)
                | BillingError::Storage(_)
        )
    }

    /// Returns true for errors the router may fail over on.
    pub fn allows_failover(&self) -> bool {
        matches!(self, BillingError::ProviderTransient { .. })
    }
}
