//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The primary key on (provider_kind, external_event_id) is the idempotency
//! key; `insert_if_absent` relies on `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    BillingError, NormalizedEvent, ProviderKind, WebhookEventRecord, WebhookEventStatus,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{SaveResult, WebhookEventRepository};

use super::db_error;

const SELECT_COLUMNS: &str = r#"
    SELECT provider_kind, external_event_id, event_type, payload_digest, status, attempts,
           duplicate_deliveries, last_error, normalized_event, subscription_id,
           received_at, processed_at
    FROM webhook_events
"#;

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    provider_kind: String,
    external_event_id: String,
    event_type: String,
    payload_digest: String,
    status: String,
    attempts: i32,
    duplicate_deliveries: i32,
    last_error: Option<String>,
    normalized_event: Option<String>,
    subscription_id: Option<Uuid>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = BillingError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let status = WebhookEventStatus::parse(&row.status).ok_or_else(|| {
            BillingError::storage(format!("invalid webhook status '{}'", row.status))
        })?;
        let normalized = row
            .normalized_event
            .as_deref()
            .map(serde_json::from_str::<NormalizedEvent>)
            .transpose()
            .map_err(|e| BillingError::storage(format!("invalid normalized event: {}", e)))?;

        Ok(WebhookEventRecord {
            provider_kind: row
                .provider_kind
                .parse::<ProviderKind>()
                .map_err(BillingError::storage)?,
            external_event_id: row.external_event_id,
            event_type: row.event_type,
            payload_digest: row.payload_digest,
            status,
            attempts: row.attempts.max(0) as u32,
            duplicate_deliveries: row.duplicate_deliveries.max(0) as u32,
            last_error: row.last_error,
            normalized,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            received_at: Timestamp::from_datetime(row.received_at),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
        })
    }
}

fn normalized_json(record: &WebhookEventRecord) -> Result<Option<String>, BillingError> {
    record
        .normalized
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(BillingError::storage)
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn insert_if_absent(&self, record: &WebhookEventRecord) -> Result<SaveResult, BillingError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                provider_kind, external_event_id, event_type, payload_digest, status, attempts,
                duplicate_deliveries, last_error, normalized_event, subscription_id,
                received_at, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (provider_kind, external_event_id) DO NOTHING
            "#,
        )
        .bind(record.provider_kind.as_str())
        .bind(&record.external_event_id)
        .bind(&record.event_type)
        .bind(&record.payload_digest)
        .bind(record.status.as_str())
        .bind(record.attempts as i32)
        .bind(record.duplicate_deliveries as i32)
        .bind(&record.last_error)
        .bind(normalized_json(record)?)
        .bind(record.subscription_id.map(|id| *id.as_uuid()))
        .bind(record.received_at.as_datetime())
        .bind(record.processed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert webhook event", e))?;

        if result.rows_affected() == 1 {
            return Ok(SaveResult::Inserted);
        }

        match self
            .find(record.provider_kind, &record.external_event_id)
            .await?
        {
            Some(existing) => Ok(SaveResult::AlreadyExists(existing)),
            // Deleted by retention between the insert and the read.
            None => Err(BillingError::storage(format!(
                "webhook event {} vanished during insert",
                record.external_event_id
            ))),
        }
    }

    async fn update(&self, record: &WebhookEventRecord) -> Result<(), BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events SET
                status = $3,
                attempts = $4,
                duplicate_deliveries = $5,
                last_error = $6,
                normalized_event = $7,
                subscription_id = $8,
                processed_at = $9
            WHERE provider_kind = $1 AND external_event_id = $2
            "#,
        )
        .bind(record.provider_kind.as_str())
        .bind(&record.external_event_id)
        .bind(record.status.as_str())
        .bind(record.attempts as i32)
        .bind(record.duplicate_deliveries as i32)
        .bind(&record.last_error)
        .bind(normalized_json(record)?)
        .bind(record.subscription_id.map(|id| *id.as_uuid()))
        .bind(record.processed_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update webhook event", e))?;

        if result.rows_affected() == 0 {
            return Err(BillingError::storage(format!(
                "webhook event {} not stored",
                record.external_event_id
            )));
        }
        Ok(())
    }

    async fn find(
        &self,
        kind: ProviderKind,
        external_event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, BillingError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(&format!(
            "{} WHERE provider_kind = $1 AND external_event_id = $2",
            SELECT_COLUMNS
        ))
        .bind(kind.as_str())
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find webhook event", e))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn find_retryable(&self, limit: usize) -> Result<Vec<WebhookEventRecord>, BillingError> {
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&format!(
            "{} WHERE status = 'failed_retryable' ORDER BY received_at ASC LIMIT $1",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find retryable webhook events", e))?;

        rows.into_iter().map(WebhookEventRecord::try_from).collect()
    }

    async fn delete_final_before(&self, cutoff: Timestamp) -> Result<u64, BillingError> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE status IN ('applied', 'rejected', 'failed') AND received_at < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("purge webhook events", e))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> WebhookEventRow {
        WebhookEventRow {
            provider_kind: "wallet".into(),
            external_event_id: "WH-1".into(),
            event_type: "PAYMENT.SALE.COMPLETED".into(),
            payload_digest: "0".repeat(64),
            status: status.into(),
            attempts: 2,
            duplicate_deliveries: 0,
            last_error: Some("timeout".into()),
            normalized_event: None,
            subscription_id: None,
            received_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = WebhookEventRecord::try_from(row("failed_retryable")).unwrap();
        assert_eq!(record.provider_kind, ProviderKind::Wallet);
        assert_eq!(record.status, WebhookEventStatus::FailedRetryable);
        assert_eq!(record.attempts, 2);
    }

    #[test]
    fn unknown_status_is_a_storage_error() {
        let err = WebhookEventRecord::try_from(row("lost")).unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));
    }
}
