//! AES-256-GCM credential cipher.
//!
//! Blob layout: base64(nonce[12] || ciphertext+tag). The plaintext is the
//! JSON form of the credential set; it only exists transiently in memory.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::domain::billing::{BillingError, EncryptedCredentials, ProviderCredentials};
use crate::ports::CredentialCipher;

const NONCE_LEN: usize = 12;

pub struct AesGcmCredentialCipher {
    cipher: Aes256Gcm,
}

#[derive(Serialize)]
struct PlainCredentials<'a> {
    api_key: &'a str,
    webhook_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
}

impl AesGcmCredentialCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Builds the cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(encoded: &str) -> Result<Self, BillingError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| BillingError::config_invalid(None, format!("encryption key: {}", e)))?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            BillingError::config_invalid(
                None,
                format!("encryption key must be 32 bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self::new(&key))
    }
}

impl CredentialCipher for AesGcmCredentialCipher {
    fn encrypt(&self, credentials: &ProviderCredentials) -> Result<EncryptedCredentials, BillingError> {
        let plain = serde_json::to_vec(&PlainCredentials {
            api_key: credentials.api_key.expose_secret(),
            webhook_secret: credentials.webhook_secret.expose_secret(),
            account_id: credentials.account_id.as_deref(),
        })
        .map_err(|e| BillingError::config_invalid(None, format!("credentials: {}", e)))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plain.as_ref())
            .map_err(|_| BillingError::config_invalid(None, "credential encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&sealed);
        Ok(EncryptedCredentials::from_encoded(BASE64.encode(blob)))
    }

    fn decrypt(&self, blob: &EncryptedCredentials) -> Result<ProviderCredentials, BillingError> {
        let bytes = BASE64
            .decode(blob.as_encoded())
            .map_err(|_| BillingError::config_invalid(None, "credential blob is not base64"))?;
        if bytes.len() <= NONCE_LEN {
            return Err(BillingError::config_invalid(None, "credential blob truncated"));
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| BillingError::config_invalid(None, "credential blob failed authentication"))?;

        serde_json::from_slice(&plain)
            .map_err(|e| BillingError::config_invalid(None, format!("credential payload: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmCredentialCipher {
        AesGcmCredentialCipher::new(&[42u8; 32])
    }

    #[test]
    fn sealed_credentials_open_with_same_key() {
        let creds = ProviderCredentials::new("sk_live_1", "whsec_1", Some("acct_9".into()));
        let blob = cipher().encrypt(&creds).unwrap();
        let opened = cipher().decrypt(&blob).unwrap();

        assert_eq!(opened.api_key.expose_secret(), "sk_live_1");
        assert_eq!(opened.webhook_secret.expose_secret(), "whsec_1");
        assert_eq!(opened.account_id.as_deref(), Some("acct_9"));
    }

    #[test]
    fn blob_does_not_contain_plaintext() {
        let creds = ProviderCredentials::new("sk_live_visible", "whsec_visible", None);
        let blob = cipher().encrypt(&creds).unwrap();
        assert!(!blob.as_encoded().contains("visible"));
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let creds = ProviderCredentials::new("k", "s", None);
        assert_ne!(cipher().encrypt(&creds).unwrap(), cipher().encrypt(&creds).unwrap());
    }

    #[test]
    fn tampered_blob_fails_authentication() {
        let creds = ProviderCredentials::new("k", "s", None);
        let blob = cipher().encrypt(&creds).unwrap();
        let mut bytes = BASE64.decode(blob.as_encoded()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = EncryptedCredentials::from_encoded(BASE64.encode(bytes));

        assert!(matches!(
            cipher().decrypt(&tampered),
            Err(BillingError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(AesGcmCredentialCipher::from_base64_key(&BASE64.encode([1u8; 16])).is_err());
        assert!(AesGcmCredentialCipher::from_base64_key(&BASE64.encode([1u8; 32])).is_ok());
        assert!(AesGcmCredentialCipher::from_base64_key("%%%").is_err());
    }
}
