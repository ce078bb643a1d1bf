//! Configuration repository port.
//!
//! Every accepted configuration write is persisted as a full snapshot, so
//! the store can rebuild its in-memory view at startup and on reload, and
//! operators can read any provider's history.

use async_trait::async_trait;

use crate::domain::billing::{BillingError, ConfigSnapshot, ProviderConfiguration};
use crate::domain::foundation::ProviderId;

#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    /// Latest persisted snapshot, `None` on a fresh install.
    async fn load_latest(&self) -> Result<Option<ConfigSnapshot>, BillingError>;

    /// Persists a new snapshot version.
    ///
    /// # Errors
    ///
    /// `Storage` when a snapshot with the same version already exists.
    async fn append_version(&self, snapshot: &ConfigSnapshot) -> Result<(), BillingError>;

    /// Every stored version of one provider, oldest first.
    async fn provider_history(
        &self,
        id: ProviderId,
    ) -> Result<Vec<ProviderConfiguration>, BillingError>;
}
