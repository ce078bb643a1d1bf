//! PostgreSQL audit log. Append-only; rows are never updated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;
use crate::ports::{AuditEntry, AuditLog};

pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    actor: String,
    action: String,
    target: String,
    before_state: Option<String>,
    after_state: Option<String>,
    at: DateTime<Utc>,
}

fn parse_state(json: Option<String>) -> Option<serde_json::Value> {
    json.and_then(|s| serde_json::from_str(&s).ok())
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (actor, action, target, before_state, after_state, at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(entry.before.as_ref().map(|v| v.to_string()))
        .bind(entry.after.as_ref().map(|v| v.to_string()))
        .bind(entry.at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| BillingError::AuditUnavailable(e.to_string()))?;

        tracing::info!(
            target: "audit",
            actor = %entry.actor,
            action = %entry.action,
            target_ref = %entry.target,
            "audit entry recorded"
        );
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, BillingError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT actor, action, target, before_state, after_state, at
            FROM audit_log
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BillingError::AuditUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEntry {
                actor: row.actor,
                action: row.action,
                target: row.target,
                before: parse_state(row.before_state),
                after: parse_state(row.after_state),
                at: Timestamp::from_datetime(row.at),
            })
            .collect())
    }
}
