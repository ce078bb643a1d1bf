use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, ProviderKind, WebhookEventRecord, WebhookEventStatus};
use crate::domain::foundation::Timestamp;
use crate::ports::{SaveResult, WebhookEventRepository};

type Key = (ProviderKind, String);

#[derive(Default)]
pub struct InMemoryWebhookEventRepository {
    records: RwLock<HashMap<Key, WebhookEventRecord>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn count_with_status(&self, status: WebhookEventStatus) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .count()
    }
}

fn key(record: &WebhookEventRecord) -> Key {
    (record.provider_kind, record.external_event_id.clone())
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn insert_if_absent(&self, record: &WebhookEventRecord) -> Result<SaveResult, BillingError> {
        let mut records = self.records.write().await;
        match records.get(&key(record)) {
            Some(existing) => Ok(SaveResult::AlreadyExists(existing.clone())),
            None => {
                records.insert(key(record), record.clone());
                Ok(SaveResult::Inserted)
            }
        }
    }

    async fn update(&self, record: &WebhookEventRecord) -> Result<(), BillingError> {
        let mut records = self.records.write().await;
        match records.get_mut(&key(record)) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(BillingError::storage(format!(
                "webhook event {} not stored",
                record.external_event_id
            ))),
        }
    }

    async fn find(
        &self,
        kind: ProviderKind,
        external_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, BillingError> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, external_event_id.to_string()))
            .cloned())
    }

    async fn find_retryable(&self, limit: usize) -> Result<Vec<WebhookEventRecord>, BillingError> {
        let mut retryable: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == WebhookEventStatus::FailedRetryable)
            .cloned()
            .collect();
        retryable.sort_by_key(|r| r.received_at);
        retryable.truncate(limit);
        Ok(retryable)
    }

    async fn delete_final_before(&self, cutoff: Timestamp) -> Result<u64, BillingError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !(r.status.is_final() && r.received_at.is_before(&cutoff)));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{NormalizedEvent, NormalizedEventType};

    fn record(id: &str, at: i64) -> WebhookEventRecord {
        let event = NormalizedEvent {
            provider_kind: ProviderKind::Wallet,
            external_event_id: id.into(),
            event_type: NormalizedEventType::PaymentSucceeded,
            raw_type: "PAYMENT.SALE.COMPLETED".into(),
            external_subscription_ref: None,
            amount: None,
            period_end: None,
            provider_status: None,
            occurred_at: Timestamp::from_unix_secs(at).unwrap(),
        };
        WebhookEventRecord::received(&event, b"{}", Timestamp::from_unix_secs(at).unwrap())
    }

    #[tokio::test]
    async fn second_insert_returns_stored_record() {
        let repo = InMemoryWebhookEventRepository::new();
        let first = record("WH-1", 100);
        assert_eq!(repo.insert_if_absent(&first).await.unwrap(), SaveResult::Inserted);

        match repo.insert_if_absent(&record("WH-1", 200)).await.unwrap() {
            SaveResult::AlreadyExists(stored) => assert_eq!(stored.received_at, first.received_at),
            SaveResult::Inserted => panic!("duplicate key inserted"),
        }
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn same_id_from_other_kind_is_distinct() {
        let repo = InMemoryWebhookEventRepository::new();
        let wallet = record("evt_1", 100);
        let mut card = record("evt_1", 100);
        card.provider_kind = ProviderKind::CardNetwork;

        repo.insert_if_absent(&wallet).await.unwrap();
        assert_eq!(repo.insert_if_absent(&card).await.unwrap(), SaveResult::Inserted);
    }

    #[tokio::test]
    async fn retention_only_removes_old_final_records() {
        let repo = InMemoryWebhookEventRepository::new();
        let mut applied_old = record("old", 100);
        applied_old.status = WebhookEventStatus::Applied;
        let mut retryable_old = record("pending", 100);
        retryable_old.status = WebhookEventStatus::FailedRetryable;
        let mut applied_new = record("new", 1_000);
        applied_new.status = WebhookEventStatus::Applied;
        for r in [&applied_old, &retryable_old, &applied_new] {
            repo.insert_if_absent(r).await.unwrap();
        }

        let removed = repo
            .delete_final_before(Timestamp::from_unix_secs(500).unwrap())
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(repo.find_retryable(10).await.unwrap().len(), 1);
        assert!(repo.find(ProviderKind::Wallet, "new").await.unwrap().is_some());
    }
}
