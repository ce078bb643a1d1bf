//! PostgreSQL implementation of SubscriptionRepository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{BillingError, ProviderKind, SubscriptionStatus, UserSubscription};
use crate::domain::foundation::{
    Currency, Money, ProviderId, SubscriptionId, TierId, Timestamp, UserId,
};
use crate::ports::SubscriptionRepository;

use super::{db_error, is_constraint_violation};

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, tier_id, provider_id, provider_kind, external_ref, status,
           trial_end, current_period_start, current_period_end, grace_period_end,
           past_due_since, retry_count, next_retry_at, pending_credit_minor,
           pending_credit_currency, last_event_at, last_event_id, canceled_at,
           created_at, updated_at, version
    FROM subscriptions
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    tier_id: Uuid,
    provider_id: Uuid,
    provider_kind: String,
    external_ref: String,
    status: String,
    trial_end: Option<DateTime<Utc>>,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    grace_period_end: Option<DateTime<Utc>>,
    past_due_since: Option<DateTime<Utc>>,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    pending_credit_minor: Option<i64>,
    pending_credit_currency: Option<String>,
    last_event_at: Option<DateTime<Utc>>,
    last_event_id: Option<String>,
    canceled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

fn ts(dt: Option<DateTime<Utc>>) -> Option<Timestamp> {
    dt.map(Timestamp::from_datetime)
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> BillingError {
    BillingError::storage(format!("invalid {} in subscriptions row: {}", field, err))
}

impl TryFrom<SubscriptionRow> for UserSubscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let pending_credit = match (row.pending_credit_minor, row.pending_credit_currency) {
            (Some(minor), Some(code)) => Some(Money::new(
                minor,
                Currency::new(&code).map_err(|e| corrupt("pending_credit_currency", e))?,
            )),
            _ => None,
        };

        Ok(UserSubscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            tier_id: TierId::from_uuid(row.tier_id),
            provider_id: ProviderId::from_uuid(row.provider_id),
            provider_kind: row
                .provider_kind
                .parse::<ProviderKind>()
                .map_err(|e| corrupt("provider_kind", e))?,
            external_ref: row.external_ref,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt("status", e))?,
            trial_end: ts(row.trial_end),
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            grace_period_end: ts(row.grace_period_end),
            past_due_since: ts(row.past_due_since),
            retry_count: u32::try_from(row.retry_count).map_err(|e| corrupt("retry_count", e))?,
            next_retry_at: ts(row.next_retry_at),
            pending_credit,
            last_event_at: ts(row.last_event_at),
            last_event_id: row.last_event_id,
            canceled_at: ts(row.canceled_at),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: u64::try_from(row.version).map_err(|e| corrupt("version", e))?,
        })
    }
}

fn dt(ts: &Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, tier_id, provider_id, provider_kind, external_ref, status,
                trial_end, current_period_start, current_period_end, grace_period_end,
                past_due_since, retry_count, next_retry_at, pending_credit_minor,
                pending_credit_currency, last_event_at, last_event_id, canceled_at,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                      $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.tier_id.as_uuid())
        .bind(subscription.provider_id.as_uuid())
        .bind(subscription.provider_kind.as_str())
        .bind(&subscription.external_ref)
        .bind(subscription.status.as_str())
        .bind(dt(&subscription.trial_end))
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(dt(&subscription.grace_period_end))
        .bind(dt(&subscription.past_due_since))
        .bind(subscription.retry_count as i32)
        .bind(dt(&subscription.next_retry_at))
        .bind(subscription.pending_credit.as_ref().map(|m| m.amount_minor))
        .bind(subscription.pending_credit.as_ref().map(|m| m.currency.to_string()))
        .bind(dt(&subscription.last_event_at))
        .bind(&subscription.last_event_id)
        .bind(dt(&subscription.canceled_at))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, "subscriptions_one_live_per_user") {
                return BillingError::ActiveSubscriptionExists(subscription.user_id.clone());
            }
            db_error("insert subscription", e)
        })?;

        Ok(())
    }

    async fn update(&self, subscription: &UserSubscription) -> Result<u64, BillingError> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE subscriptions SET
                tier_id = $3,
                provider_id = $4,
                external_ref = $5,
                status = $6,
                trial_end = $7,
                current_period_start = $8,
                current_period_end = $9,
                grace_period_end = $10,
                past_due_since = $11,
                retry_count = $12,
                next_retry_at = $13,
                pending_credit_minor = $14,
                pending_credit_currency = $15,
                last_event_at = $16,
                last_event_id = $17,
                canceled_at = $18,
                updated_at = $19,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version as i64)
        .bind(subscription.tier_id.as_uuid())
        .bind(subscription.provider_id.as_uuid())
        .bind(&subscription.external_ref)
        .bind(subscription.status.as_str())
        .bind(dt(&subscription.trial_end))
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(dt(&subscription.grace_period_end))
        .bind(dt(&subscription.past_due_since))
        .bind(subscription.retry_count as i32)
        .bind(dt(&subscription.next_retry_at))
        .bind(subscription.pending_credit.as_ref().map(|m| m.amount_minor))
        .bind(subscription.pending_credit.as_ref().map(|m| m.currency.to_string()))
        .bind(dt(&subscription.last_event_at))
        .bind(&subscription.last_event_id)
        .bind(dt(&subscription.canceled_at))
        .bind(subscription.updated_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update subscription", e))?;

        match new_version {
            Some(version) => Ok(version as u64),
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM subscriptions WHERE id = $1")
                        .bind(subscription.id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| db_error("check subscription version", e))?;
                Err(match exists {
                    Some(_) => BillingError::ConcurrentModification(subscription.id),
                    None => BillingError::SubscriptionNotFound(subscription.id.to_string()),
                })
            }
        }
    }

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<UserSubscription>, BillingError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find subscription", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_by_external_ref(
        &self,
        kind: ProviderKind,
        external_ref: &str,
    ) -> Result<Option<UserSubscription>, BillingError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE provider_kind = $1 AND external_ref = $2",
            SELECT_COLUMNS
        ))
        .bind(kind.as_str())
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find subscription by external ref", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_live_by_user(&self, user_id: &UserId) -> Result<Option<UserSubscription>, BillingError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE user_id = $1 AND status IN ('trialing', 'active', 'past_due', 'suspended')",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find live subscription", e))?;

        row.map(UserSubscription::try_from).transpose()
    }

    async fn find_needing_attention(&self, now: Timestamp) -> Result<Vec<UserSubscription>, BillingError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE (status = 'trialing' AND trial_end <= $1 AND (next_retry_at IS NULL OR next_retry_at <= $1))
               OR (status = 'past_due' AND (next_retry_at <= $1 OR grace_period_end <= $1))
            ORDER BY created_at ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find subscriptions needing attention", e))?;

        rows.into_iter().map(UserSubscription::try_from).collect()
    }

    async fn count_by_status(&self) -> Result<HashMap<SubscriptionStatus, u64>, BillingError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM subscriptions GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("count subscriptions by status", e))?;

        rows.into_iter()
            .map(|(status, count)| {
                let status = status
                    .parse::<SubscriptionStatus>()
                    .map_err(|e| corrupt("status", e))?;
                Ok((status, count as u64))
            })
            .collect()
    }

    async fn count_by_provider(&self, provider_id: ProviderId) -> Result<u64, BillingError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE provider_id = $1")
            .bind(provider_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count subscriptions by provider", e))?;
        Ok(count as u64)
    }

    async fn count_by_tier(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<HashMap<TierId, u64>, BillingError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT tier_id, COUNT(*) FROM subscriptions
            WHERE status = ANY($1)
            GROUP BY tier_id
            "#,
        )
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("count subscriptions by tier", e))?;

        Ok(rows
            .into_iter()
            .map(|(tier, count)| (TierId::from_uuid(tier), count as u64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            tier_id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            provider_kind: "card-network".into(),
            external_ref: "sub_1".into(),
            status: "past_due".into(),
            trial_end: None,
            current_period_start: now,
            current_period_end: now,
            grace_period_end: Some(now),
            past_due_since: Some(now),
            retry_count: 1,
            next_retry_at: Some(now),
            pending_credit_minor: Some(250),
            pending_credit_currency: Some("USD".into()),
            last_event_at: None,
            last_event_id: None,
            canceled_at: None,
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    #[test]
    fn row_converts_to_subscription() {
        let sub = UserSubscription::try_from(row()).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.provider_kind, ProviderKind::CardNetwork);
        assert_eq!(sub.pending_credit.unwrap().amount_minor, 250);
        assert_eq!(sub.version, 3);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut bad = row();
        bad.status = "paused".into();
        assert!(matches!(
            UserSubscription::try_from(bad),
            Err(BillingError::Storage(_))
        ));
    }

    #[test]
    fn credit_without_currency_is_dropped() {
        let mut partial = row();
        partial.pending_credit_currency = None;
        assert!(UserSubscription::try_from(partial).unwrap().pending_credit.is_none());
    }
}
