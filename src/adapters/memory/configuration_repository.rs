use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, ConfigSnapshot, ProviderConfiguration};
use crate::domain::foundation::ProviderId;
use crate::ports::ConfigurationRepository;

/// Keeps every snapshot version in insertion order.
#[derive(Default)]
pub struct InMemoryConfigurationRepository {
    versions: RwLock<Vec<ConfigSnapshot>>,
}

impl InMemoryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn version_count(&self) -> usize {
        self.versions.read().await.len()
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn load_latest(&self) -> Result<Option<ConfigSnapshot>, BillingError> {
        Ok(self.versions.read().await.last().cloned())
    }

    async fn append_version(&self, snapshot: &ConfigSnapshot) -> Result<(), BillingError> {
        let mut versions = self.versions.write().await;
        if versions.iter().any(|s| s.version == snapshot.version) {
            return Err(BillingError::storage(format!(
                "configuration version {} already stored",
                snapshot.version
            )));
        }
        versions.push(snapshot.clone());
        Ok(())
    }

    async fn provider_history(
        &self,
        id: ProviderId,
    ) -> Result<Vec<ProviderConfiguration>, BillingError> {
        let versions = self.versions.read().await;
        let mut history: Vec<ProviderConfiguration> = Vec::new();
        for snapshot in versions.iter() {
            if let Some(p) = snapshot.provider(id) {
                if history.last().map(|last| last.version) != Some(p.version) {
                    history.push(p.clone());
                }
            }
        }
        Ok(history)
    }
}
