//! WebhookEventRepository port - durable webhook event records.
//!
//! Providers deliver the same event more than once (timeouts, 5xx answers,
//! acknowledgements that never arrive). The record keyed by
//! (provider kind, external event id) is what makes re-delivery harmless.
//!
//! Implementations must use a uniqueness constraint on the key so that two
//! concurrent deliveries of one event cannot both insert.

use async_trait::async_trait;

use crate::domain::billing::{BillingError, ProviderKind, WebhookEventRecord};
use crate::domain::foundation::Timestamp;

/// Result of attempting to insert a webhook record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveResult {
    /// First delivery of this event.
    Inserted,
    /// Already known; carries the stored record.
    AlreadyExists(WebhookEventRecord),
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Inserts the record unless one with the same key exists.
    async fn insert_if_absent(&self, record: &WebhookEventRecord) -> Result<SaveResult, BillingError>;

    /// Overwrites the stored record with the same key.
    async fn update(&self, record: &WebhookEventRecord) -> Result<(), BillingError>;

    async fn find(
        &self,
        kind: ProviderKind,
        external_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, BillingError>;

    /// Up to `limit` records in `FailedRetryable`, oldest first.
    async fn find_retryable(&self, limit: usize) -> Result<Vec<WebhookEventRecord>, BillingError>;

    /// Deletes final records received before `cutoff`. Returns the count.
    async fn delete_final_before(&self, cutoff: Timestamp) -> Result<u64, BillingError>;
}
