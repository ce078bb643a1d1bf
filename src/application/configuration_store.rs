//! ConfigurationStore - Versioned, hot-reloadable provider configuration.
//!
//! Readers get an `Arc<ConfigSnapshot>` from a `tokio::sync::watch` channel
//! and never block on writers. Writers are serialized by a mutex, build the
//! next snapshot from the current one and publish it with a single send, so
//! a reader sees either the old snapshot or the new one in full.
//!
//! Write path, in order:
//! 1. Build and validate the next snapshot
//! 2. Append the audit entry (failure aborts the write)
//! 3. Persist the snapshot version
//! 4. Publish to subscribers

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::domain::billing::{
    BillingError, ConfigSnapshot, GlobalBillingPolicy, PaymentMethod, ProviderConfiguration,
    ProviderCredentials, ProviderEnvironment, ProviderKind,
};
use crate::domain::foundation::{Clock, Currency, ProviderId, ValidationError};
use crate::ports::{
    AuditEntry, AuditLog, ConfigurationRepository, ConnectivityReport, CredentialCipher,
    GatewayRegistry, SubscriptionRepository,
};

/// Operator input for creating or editing a provider.
///
/// `id: None` creates a provider. On edit, `credentials: None` keeps the
/// stored credential blob.
#[derive(Debug, Clone)]
pub struct ProviderDraft {
    pub id: Option<ProviderId>,
    pub kind: ProviderKind,
    pub display_name: String,
    pub environment: ProviderEnvironment,
    pub priority: u32,
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub supported_currencies: Vec<Currency>,
    pub supported_methods: Vec<PaymentMethod>,
    pub credentials: Option<ProviderCredentials>,
    pub api_base_url: Option<String>,
}

/// What `remove_provider` ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRemoval {
    Removed,
    /// Subscriptions still reference the provider; it was disabled instead.
    Deactivated(ProviderConfiguration),
}

pub struct ConfigurationStore {
    repository: Arc<dyn ConfigurationRepository>,
    audit: Arc<dyn AuditLog>,
    cipher: Arc<dyn CredentialCipher>,
    gateways: Arc<dyn GatewayRegistry>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    clock: Arc<dyn Clock>,
    current: watch::Sender<Arc<ConfigSnapshot>>,
    write_lock: Mutex<()>,
}

impl ConfigurationStore {
    /// Loads the latest persisted snapshot, or starts from an empty one.
    pub async fn load(
        repository: Arc<dyn ConfigurationRepository>,
        audit: Arc<dyn AuditLog>,
        cipher: Arc<dyn CredentialCipher>,
        gateways: Arc<dyn GatewayRegistry>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BillingError> {
        let initial = match repository.load_latest().await? {
            Some(snapshot) => snapshot,
            None => ConfigSnapshot::empty(clock.now()),
        };
        tracing::info!(
            version = initial.version,
            providers = initial.providers.len(),
            "configuration loaded"
        );
        let (current, _) = watch::channel(Arc::new(initial));

        Ok(Self {
            repository,
            audit,
            cipher,
            gateways,
            subscriptions,
            clock,
            current,
            write_lock: Mutex::new(()),
        })
    }

    /// Current snapshot. Cheap; never waits for a writer.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.borrow().clone()
    }

    /// A receiver that always holds the latest published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.current.subscribe()
    }

    /// Enabled providers in ascending priority order.
    pub fn get_active_providers(&self) -> Vec<ProviderConfiguration> {
        self.snapshot().active_providers()
    }

    pub fn get_policy(&self) -> GlobalBillingPolicy {
        self.snapshot().policy.clone()
    }

    /// Creates or edits a provider. Returns the new version.
    pub async fn upsert_provider(
        &self,
        actor: &str,
        draft: ProviderDraft,
    ) -> Result<ProviderConfiguration, BillingError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let now = self.clock.now();

        let previous = match draft.id {
            Some(id) => Some(
                current
                    .provider(id)
                    .cloned()
                    .ok_or(BillingError::ProviderNotFound(id))?,
            ),
            None => None,
        };
        if let Some(prev) = &previous {
            if prev.kind != draft.kind {
                return Err(ValidationError::invalid_format(
                    "kind",
                    "a provider's kind cannot change; create a new provider",
                )
                .into());
            }
        }

        let credentials = match (&draft.credentials, &previous) {
            (Some(plain), _) => {
                plain.validate()?;
                self.cipher.encrypt(plain)?
            }
            (None, Some(prev)) => prev.credentials.clone(),
            (None, None) => return Err(ValidationError::empty_field("credentials").into()),
        };

        let next = ProviderConfiguration {
            id: previous.as_ref().map(|p| p.id).unwrap_or_default(),
            version: previous.as_ref().map(|p| p.version + 1).unwrap_or(1),
            kind: draft.kind,
            display_name: draft.display_name,
            environment: draft.environment,
            priority: draft.priority,
            enabled: draft.enabled,
            timeout_secs: draft.timeout_secs,
            max_retries: draft.max_retries,
            supported_currencies: draft.supported_currencies,
            supported_methods: draft.supported_methods,
            credentials,
            api_base_url: draft.api_base_url,
            updated_at: now,
            updated_by: actor.to_string(),
        };
        next.validate()?;

        let action = if previous.is_some() {
            "provider.update"
        } else {
            "provider.create"
        };
        let snapshot = current.with_provider(next.clone(), now);
        self.commit(
            AuditEntry::new(actor, action, format!("provider:{}", next.id), now)
                .with_diff(previous.as_ref(), Some(&next)),
            snapshot,
        )
        .await?;

        tracing::info!(
            provider_id = %next.id,
            version = next.version,
            kind = %next.kind,
            enabled = next.enabled,
            "provider configuration saved"
        );
        Ok(next)
    }

    /// Removes a provider, or disables it when subscriptions reference it.
    ///
    /// References are counted under the write lock. A subscription created
    /// from an older snapshot after the count is still served: the router
    /// falls back to the provider's last stored version.
    pub async fn remove_provider(
        &self,
        actor: &str,
        id: ProviderId,
    ) -> Result<ProviderRemoval, BillingError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let now = self.clock.now();
        let existing = current
            .provider(id)
            .cloned()
            .ok_or(BillingError::ProviderNotFound(id))?;
        let referenced = self.subscriptions.count_by_provider(id).await?;

        if referenced > 0 {
            let disabled = ProviderConfiguration {
                version: existing.version + 1,
                enabled: false,
                updated_at: now,
                updated_by: actor.to_string(),
                ..existing.clone()
            };
            self.commit(
                AuditEntry::new(actor, "provider.deactivate", format!("provider:{}", id), now)
                    .with_diff(Some(&existing), Some(&disabled)),
                current.with_provider(disabled.clone(), now),
            )
            .await?;
            tracing::info!(provider_id = %id, referenced, "provider deactivated instead of removed");
            return Ok(ProviderRemoval::Deactivated(disabled));
        }

        self.commit(
            AuditEntry::new(actor, "provider.remove", format!("provider:{}", id), now)
                .with_diff(Some(&existing), None::<&ProviderConfiguration>),
            current.without_provider(id, now),
        )
        .await?;
        tracing::info!(provider_id = %id, "provider removed");
        Ok(ProviderRemoval::Removed)
    }

    /// Replaces the global policy. The version is assigned here.
    pub async fn update_policy(
        &self,
        actor: &str,
        policy: GlobalBillingPolicy,
    ) -> Result<GlobalBillingPolicy, BillingError> {
        policy.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let now = self.clock.now();
        let next = GlobalBillingPolicy {
            version: current.policy.version + 1,
            ..policy
        };

        self.commit(
            AuditEntry::new(actor, "policy.update", "policy", now)
                .with_diff(Some(&current.policy), Some(&next)),
            current.with_policy(next.clone(), now),
        )
        .await?;
        tracing::info!(version = next.version, "billing policy updated");
        Ok(next)
    }

    /// Runs the provider's lightweight connectivity check.
    pub async fn test_connectivity(&self, id: ProviderId) -> Result<ConnectivityReport, BillingError> {
        let snapshot = self.snapshot();
        let config = snapshot.provider(id).ok_or(BillingError::ProviderNotFound(id))?;
        let gateway = self.gateways.gateway_for(config)?;

        let report = match tokio::time::timeout(config.timeout(), gateway.test_connectivity()).await {
            Ok(report) => report,
            Err(_) => ConnectivityReport::failed(
                config.timeout().as_millis() as u64,
                format!("no answer within {}s", config.timeout_secs),
            ),
        };
        tracing::info!(
            provider_id = %id,
            success = report.success,
            latency_ms = report.latency_ms,
            "connectivity test"
        );
        Ok(report)
    }

    pub async fn provider_history(
        &self,
        id: ProviderId,
    ) -> Result<Vec<ProviderConfiguration>, BillingError> {
        self.repository.provider_history(id).await
    }

    /// Picks up versions written by other instances.
    ///
    /// Returns whether a newer snapshot was published.
    pub async fn reload(&self) -> Result<bool, BillingError> {
        let _guard = self.write_lock.lock().await;
        let latest = match self.repository.load_latest().await? {
            Some(snapshot) => snapshot,
            None => return Ok(false),
        };
        if latest.version <= self.snapshot().version {
            return Ok(false);
        }
        tracing::info!(version = latest.version, "newer configuration picked up");
        self.current.send_replace(Arc::new(latest));
        Ok(true)
    }

    /// Age beyond which a snapshot may be stale across instances.
    pub fn staleness_bound(refresh_every: Duration) -> Duration {
        refresh_every
    }

    async fn commit(&self, entry: AuditEntry, next: ConfigSnapshot) -> Result<(), BillingError> {
        self.audit.append(entry).await?;
        self.repository.append_version(&next).await?;
        self.current.send_replace(Arc::new(next));
        Ok(())
    }
}

/// Serializable view of a provider without its credential blob.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub id: ProviderId,
    pub version: u64,
    pub kind: ProviderKind,
    pub display_name: String,
    pub environment: ProviderEnvironment,
    pub priority: u32,
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub supported_currencies: Vec<Currency>,
    pub supported_methods: Vec<PaymentMethod>,
    pub api_base_url: Option<String>,
    pub updated_by: String,
}

impl From<&ProviderConfiguration> for ProviderSummary {
    fn from(p: &ProviderConfiguration) -> Self {
        Self {
            id: p.id,
            version: p.version,
            kind: p.kind,
            display_name: p.display_name.clone(),
            environment: p.environment,
            priority: p.priority,
            enabled: p.enabled,
            timeout_secs: p.timeout_secs,
            max_retries: p.max_retries,
            supported_currencies: p.supported_currencies.clone(),
            supported_methods: p.supported_methods.clone(),
            api_base_url: p.api_base_url.clone(),
            updated_by: p.updated_by.clone(),
        }
    }
}
