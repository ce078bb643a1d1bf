//! Gateway registries.
//!
//! `HttpGatewayRegistry` is the production registry: it decrypts a
//! configuration's credentials and builds the adapter for its kind. Built
//! gateways are cached per (provider, version), so an edit produces a fresh
//! adapter while unchanged providers reuse theirs.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::domain::billing::{BillingError, ProviderConfiguration, ProviderKind};
use crate::domain::foundation::{Clock, ProviderId};
use crate::ports::{CredentialCipher, GatewayRegistry, ProviderGateway};

use super::{CardNetworkGateway, GatewayEndpoints, GatewaySettings, WalletGateway};

pub struct HttpGatewayRegistry {
    cipher: Arc<dyn CredentialCipher>,
    clock: Arc<dyn Clock>,
    endpoints: GatewayEndpoints,
    replay_tolerance_secs: i64,
    cache: DashMap<ProviderId, (u64, Arc<dyn ProviderGateway>)>,
}

impl HttpGatewayRegistry {
    pub fn new(
        cipher: Arc<dyn CredentialCipher>,
        clock: Arc<dyn Clock>,
        endpoints: GatewayEndpoints,
        replay_tolerance_secs: i64,
    ) -> Self {
        Self {
            cipher,
            clock,
            endpoints,
            replay_tolerance_secs,
            cache: DashMap::new(),
        }
    }

    fn build(&self, config: &ProviderConfiguration) -> Result<Arc<dyn ProviderGateway>, BillingError> {
        let credentials = self.cipher.decrypt(&config.credentials).map_err(|e| {
            BillingError::config_invalid(Some(config.id), format!("credentials unusable: {}", e))
        })?;
        credentials
            .validate()
            .map_err(|e| BillingError::config_invalid(Some(config.id), e.to_string()))?;

        let settings = GatewaySettings {
            base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| self.endpoints.default_for(config.kind).to_string()),
            credentials,
            timeout: Duration::from_secs(config.timeout_secs),
            clock: self.clock.clone(),
            replay_tolerance_secs: self.replay_tolerance_secs,
        };

        let gateway: Arc<dyn ProviderGateway> = match config.kind {
            ProviderKind::CardNetwork => Arc::new(
                CardNetworkGateway::new(settings).map_err(|e| e.into_billing(config.id))?,
            ),
            ProviderKind::Wallet => {
                Arc::new(WalletGateway::new(settings).map_err(|e| e.into_billing(config.id))?)
            }
        };
        Ok(gateway)
    }
}

impl GatewayRegistry for HttpGatewayRegistry {
    fn gateway_for(
        &self,
        config: &ProviderConfiguration,
    ) -> Result<Arc<dyn ProviderGateway>, BillingError> {
        if let Some(entry) = self.cache.get(&config.id) {
            let (version, gateway) = entry.value();
            if *version == config.version {
                return Ok(gateway.clone());
            }
        }

        let gateway = self.build(config)?;
        tracing::debug!(
            provider_id = %config.id,
            version = config.version,
            kind = %config.kind,
            "gateway built"
        );
        self.cache.insert(config.id, (config.version, gateway.clone()));
        Ok(gateway)
    }
}

/// Registry of pre-built gateways, keyed by provider id.
///
/// Used by tests and local development where no remote provider exists.
#[derive(Default)]
pub struct StaticGatewayRegistry {
    gateways: DashMap<ProviderId, Arc<dyn ProviderGateway>>,
}

impl StaticGatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider_id: ProviderId, gateway: Arc<dyn ProviderGateway>) {
        self.gateways.insert(provider_id, gateway);
    }
}

impl GatewayRegistry for StaticGatewayRegistry {
    fn gateway_for(
        &self,
        config: &ProviderConfiguration,
    ) -> Result<Arc<dyn ProviderGateway>, BillingError> {
        self.gateways
            .get(&config.id)
            .map(|g| g.value().clone())
            .ok_or_else(|| BillingError::config_invalid(Some(config.id), "no gateway registered"))
    }
}
