//! PostgreSQL implementation of ConfigurationRepository.
//!
//! Each snapshot version is one row holding the serialized snapshot.
//! Credential blobs stay encrypted inside it.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::{BillingError, ConfigSnapshot, ProviderConfiguration};
use crate::domain::foundation::ProviderId;
use crate::ports::ConfigurationRepository;

use super::{db_error, is_unique_violation};

pub struct PostgresConfigurationRepository {
    pool: PgPool,
}

impl PostgresConfigurationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(json: &str) -> Result<ConfigSnapshot, BillingError> {
    serde_json::from_str(json)
        .map_err(|e| BillingError::storage(format!("unreadable config snapshot: {}", e)))
}

#[async_trait]
impl ConfigurationRepository for PostgresConfigurationRepository {
    async fn load_latest(&self) -> Result<Option<ConfigSnapshot>, BillingError> {
        let json: Option<String> = sqlx::query_scalar(
            "SELECT snapshot FROM config_snapshots ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("load config snapshot", e))?;

        json.as_deref().map(decode).transpose()
    }

    async fn append_version(&self, snapshot: &ConfigSnapshot) -> Result<(), BillingError> {
        let json = serde_json::to_string(snapshot).map_err(BillingError::storage)?;

        sqlx::query("INSERT INTO config_snapshots (version, snapshot, created_at) VALUES ($1, $2, $3)")
            .bind(snapshot.version as i64)
            .bind(json)
            .bind(snapshot.created_at.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return BillingError::storage(format!(
                        "configuration version {} already stored",
                        snapshot.version
                    ));
                }
                db_error("append config snapshot", e)
            })?;

        Ok(())
    }

    async fn provider_history(
        &self,
        id: ProviderId,
    ) -> Result<Vec<ProviderConfiguration>, BillingError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT snapshot FROM config_snapshots ORDER BY version ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("load provider history", e))?;

        let mut history: Vec<ProviderConfiguration> = Vec::new();
        for json in rows {
            let snapshot = decode(&json)?;
            if let Some(provider) = snapshot.provider(id) {
                if history.last().map(|last| last.version) != Some(provider.version) {
                    history.push(provider.clone());
                }
            }
        }
        Ok(history)
    }
}
