//! Provider gateway adapters.
//!
//! - `card_network` - Form-encoded REST processor with timestamped HMAC webhooks
//! - `wallet` - JSON REST wallet processor with transmission-signed webhooks
//! - `mock_gateway` - Scriptable in-process gateway for tests
//! - `registry` - Builds (and caches) gateways from configuration versions

mod card_network;
mod http_support;
mod mock_gateway;
mod registry;
mod wallet;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::billing::{ProviderCredentials, ProviderKind};
use crate::domain::foundation::Clock;

pub use card_network::{CardNetworkGateway, SIGNATURE_HEADER as CARD_NETWORK_SIGNATURE_HEADER};
pub use mock_gateway::{MockCall, MockGateway, MOCK_SIGNATURE_HEADER};
pub use registry::{HttpGatewayRegistry, StaticGatewayRegistry};
pub use wallet::{WalletGateway, TRANSMISSION_SIG_HEADER, TRANSMISSION_TIME_HEADER};

/// Everything a REST gateway needs, with credentials already decrypted.
pub struct GatewaySettings {
    pub base_url: String,
    pub credentials: ProviderCredentials,
    pub timeout: Duration,
    pub clock: Arc<dyn Clock>,
    /// Maximum age of a webhook signature timestamp.
    pub replay_tolerance_secs: i64,
}

/// Default API roots per provider kind, overridable per configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEndpoints {
    pub card_network: String,
    pub wallet: String,
}

impl GatewayEndpoints {
    pub fn default_for(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::CardNetwork => &self.card_network,
            ProviderKind::Wallet => &self.wallet,
        }
    }
}
