use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::BillingError;
use crate::ports::{AuditEntry, AuditLog};

/// Audit log kept in memory and mirrored to the `audit` tracing target.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage of the compliance sink.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), BillingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BillingError::AuditUnavailable("audit sink offline".into()));
        }
        tracing::info!(
            target: "audit",
            actor = %entry.actor,
            action = %entry.action,
            target_ref = %entry.target,
            "admin action"
        );
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, BillingError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
