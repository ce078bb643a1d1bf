//! Credential encryption port.
//!
//! Provider credentials are stored encrypted at rest. Only the gateway
//! registry ever decrypts them.

use crate::domain::billing::{BillingError, EncryptedCredentials, ProviderCredentials};

/// Symmetric encryption of provider credential sets.
pub trait CredentialCipher: Send + Sync {
    fn encrypt(&self, credentials: &ProviderCredentials) -> Result<EncryptedCredentials, BillingError>;

    /// # Errors
    ///
    /// `ConfigInvalid` when the blob is corrupt or was sealed under another key.
    fn decrypt(&self, blob: &EncryptedCredentials) -> Result<ProviderCredentials, BillingError>;
}
