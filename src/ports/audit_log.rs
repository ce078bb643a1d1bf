//! Administrative audit log port.
//!
//! Every configuration write appends an entry before the new snapshot is
//! published. An append failure aborts the write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;

/// One audited administrative action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    /// What was acted on, e.g. `provider:<uuid>` or `policy`.
    pub target: String,
    /// Previous state; credential blobs are never included.
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub at: Timestamp,
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            before: None,
            after: None,
            at,
        }
    }

    /// Attaches the diff, dropping any `credentials` field.
    pub fn with_diff<B: Serialize, A: Serialize>(mut self, before: Option<&B>, after: Option<&A>) -> Self {
        self.before = before.and_then(redacted_json);
        self.after = after.and_then(redacted_json);
        self
    }
}

fn redacted_json<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    let mut json = serde_json::to_value(value).ok()?;
    if let Some(object) = json.as_object_mut() {
        if object.contains_key("credentials") {
            object.insert("credentials".to_string(), serde_json::Value::String("[REDACTED]".into()));
        }
    }
    Some(json)
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), BillingError>;

    /// Most recent entries first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{provider_fixtures::provider, ProviderKind};

    #[test]
    fn audit_log_is_object_safe() {
        fn _accepts_dyn(_log: &dyn AuditLog) {}
    }

    #[test]
    fn diff_redacts_credentials() {
        let p = provider(ProviderKind::CardNetwork, 1);
        let entry = AuditEntry::new("admin", "provider.upsert", "provider", p.updated_at)
            .with_diff(None::<&()>, Some(&p));

        let after = entry.after.unwrap();
        assert_eq!(after["credentials"], "[REDACTED]");
        assert_eq!(after["display_name"], p.display_name);
        assert!(entry.before.is_none());
    }
}
