//! Admin API authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// HS256 admin token settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Shared signing secret
    pub jwt_secret: SecretString,

    /// Expected `iss` claim
    pub jwt_issuer: String,

    /// Role an operator token must carry
    #[serde(default = "default_required_role")]
    pub required_role: String,
}

impl AdminConfig {
    pub fn jwt_secret_bytes(&self) -> &[u8] {
        self.jwt_secret.expose_secret().as_bytes()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jwt_secret.expose_secret().len() < 32 {
            return Err(ValidationError::WeakJwtSecret);
        }
        if self.jwt_issuer.is_empty() {
            return Err(ValidationError::MissingRequired("ADMIN__JWT_ISSUER"));
        }
        if self.required_role.is_empty() {
            return Err(ValidationError::MissingRequired("ADMIN__REQUIRED_ROLE"));
        }
        Ok(())
    }
}

fn default_required_role() -> String {
    "billing_admin".to_string()
}
