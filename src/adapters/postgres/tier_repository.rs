//! PostgreSQL implementation of TierRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{BillingError, BillingPeriod, SubscriptionTier};
use crate::domain::foundation::{Currency, Money, TierId, Timestamp};
use crate::ports::TierRepository;

use super::db_error;

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, description, price_minor, currency, period, features, active,
           is_default, replaced_by, created_at
    FROM subscription_tiers
"#;

pub struct PostgresTierRepository {
    pool: PgPool,
}

impl PostgresTierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    price_minor: i64,
    currency: String,
    period: String,
    features: String,
    active: bool,
    is_default: bool,
    replaced_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

fn parse_period(s: &str) -> Result<BillingPeriod, BillingError> {
    match s {
        "monthly" => Ok(BillingPeriod::Monthly),
        "yearly" => Ok(BillingPeriod::Yearly),
        other => Err(BillingError::storage(format!("invalid billing period '{}'", other))),
    }
}

fn period_to_string(period: BillingPeriod) -> &'static str {
    match period {
        BillingPeriod::Monthly => "monthly",
        BillingPeriod::Yearly => "yearly",
    }
}

impl TryFrom<TierRow> for SubscriptionTier {
    type Error = BillingError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        let features: Vec<String> = serde_json::from_str(&row.features)
            .map_err(|e| BillingError::storage(format!("invalid tier features: {}", e)))?;

        Ok(SubscriptionTier {
            id: TierId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            price: Money::new(
                row.price_minor,
                Currency::new(row.currency.trim()).map_err(BillingError::storage)?,
            ),
            period: parse_period(&row.period)?,
            features,
            active: row.active,
            is_default: row.is_default,
            replaced_by: row.replaced_by.map(TierId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl TierRepository for PostgresTierRepository {
    async fn save(&self, tier: &SubscriptionTier) -> Result<(), BillingError> {
        let features = serde_json::to_string(&tier.features).map_err(BillingError::storage)?;

        sqlx::query(
            r#"
            INSERT INTO subscription_tiers (
                id, name, description, price_minor, currency, period, features, active,
                is_default, replaced_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price_minor = EXCLUDED.price_minor,
                currency = EXCLUDED.currency,
                period = EXCLUDED.period,
                features = EXCLUDED.features,
                active = EXCLUDED.active,
                is_default = EXCLUDED.is_default,
                replaced_by = EXCLUDED.replaced_by
            "#,
        )
        .bind(tier.id.as_uuid())
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.price.amount_minor)
        .bind(tier.price.currency.as_str())
        .bind(period_to_string(tier.period))
        .bind(features)
        .bind(tier.active)
        .bind(tier.is_default)
        .bind(tier.replaced_by.map(|id| *id.as_uuid()))
        .bind(tier.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save tier", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: TierId) -> Result<Option<SubscriptionTier>, BillingError> {
        let row: Option<TierRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find tier", e))?;

        row.map(SubscriptionTier::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<SubscriptionTier>, BillingError> {
        let rows: Vec<TierRow> = sqlx::query_as(&format!("{} ORDER BY name ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list tiers", e))?;

        rows.into_iter().map(SubscriptionTier::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_strings_round_trip() {
        for period in [BillingPeriod::Monthly, BillingPeriod::Yearly] {
            assert_eq!(parse_period(period_to_string(period)).unwrap(), period);
        }
        assert!(parse_period("weekly").is_err());
    }
}
