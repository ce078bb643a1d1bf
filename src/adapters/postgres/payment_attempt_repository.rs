//! PostgreSQL implementation of PaymentAttemptRepository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{BillingError, ChargeReason, PaymentAttempt, PaymentOutcome};
use crate::domain::foundation::{
    Currency, Money, PaymentAttemptId, ProviderId, SubscriptionId, Timestamp,
};
use crate::ports::PaymentAttemptRepository;

use super::db_error;

const SELECT_COLUMNS: &str = r#"
    SELECT id, subscription_id, provider_id, attempt_number, reason, amount_minor, currency,
           outcome, payment_ref, provider_code, attempted_at
    FROM payment_attempts
"#;

pub struct PostgresPaymentAttemptRepository {
    pool: PgPool,
}

impl PostgresPaymentAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentAttemptRow {
    id: Uuid,
    subscription_id: Uuid,
    provider_id: Uuid,
    attempt_number: i32,
    reason: String,
    amount_minor: i64,
    currency: String,
    outcome: String,
    payment_ref: Option<String>,
    provider_code: Option<String>,
    attempted_at: DateTime<Utc>,
}

fn parse_outcome(s: &str) -> Result<PaymentOutcome, BillingError> {
    match s {
        "succeeded" => Ok(PaymentOutcome::Succeeded),
        "declined" => Ok(PaymentOutcome::Declined),
        "error" => Ok(PaymentOutcome::Error),
        other => Err(BillingError::storage(format!("invalid payment outcome '{}'", other))),
    }
}

fn parse_reason(s: &str) -> Result<ChargeReason, BillingError> {
    match s {
        "scheduled_retry" => Ok(ChargeReason::ScheduledRetry),
        "trial_conversion" => Ok(ChargeReason::TrialConversion),
        "reactivation" => Ok(ChargeReason::Reactivation),
        other => Err(BillingError::storage(format!("invalid charge reason '{}'", other))),
    }
}

fn reason_to_string(reason: ChargeReason) -> &'static str {
    match reason {
        ChargeReason::ScheduledRetry => "scheduled_retry",
        ChargeReason::TrialConversion => "trial_conversion",
        ChargeReason::Reactivation => "reactivation",
    }
}

impl TryFrom<PaymentAttemptRow> for PaymentAttempt {
    type Error = BillingError;

    fn try_from(row: PaymentAttemptRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: PaymentAttemptId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            provider_id: ProviderId::from_uuid(row.provider_id),
            attempt_number: row.attempt_number.max(0) as u32,
            reason: parse_reason(&row.reason)?,
            amount: Money::new(
                row.amount_minor,
                Currency::new(row.currency.trim()).map_err(BillingError::storage)?,
            ),
            outcome: parse_outcome(&row.outcome)?,
            payment_ref: row.payment_ref,
            provider_code: row.provider_code,
            attempted_at: Timestamp::from_datetime(row.attempted_at),
        })
    }
}

#[async_trait]
impl PaymentAttemptRepository for PostgresPaymentAttemptRepository {
    async fn append(&self, attempt: &PaymentAttempt) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                id, subscription_id, provider_id, attempt_number, reason, amount_minor,
                currency, outcome, payment_ref, provider_code, attempted_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(attempt.id.as_uuid())
        .bind(attempt.subscription_id.as_uuid())
        .bind(attempt.provider_id.as_uuid())
        .bind(attempt.attempt_number as i32)
        .bind(reason_to_string(attempt.reason))
        .bind(attempt.amount.amount_minor)
        .bind(attempt.amount.currency.as_str())
        .bind(attempt.outcome.as_str())
        .bind(&attempt.payment_ref)
        .bind(&attempt.provider_code)
        .bind(attempt.attempted_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append payment attempt", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>, BillingError> {
        let row: Option<PaymentAttemptRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find payment attempt", e))?;

        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        let rows: Vec<PaymentAttemptRow> = sqlx::query_as(&format!(
            "{} WHERE subscription_id = $1 ORDER BY attempted_at ASC",
            SELECT_COLUMNS
        ))
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payment attempts", e))?;

        rows.into_iter().map(PaymentAttempt::try_from).collect()
    }

    async fn count_by_outcome(&self) -> Result<HashMap<PaymentOutcome, u64>, BillingError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT outcome, COUNT(*) FROM payment_attempts GROUP BY outcome")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("count payment attempts", e))?;

        rows.into_iter()
            .map(|(outcome, count)| Ok((parse_outcome(&outcome)?, count as u64)))
            .collect()
    }
}
