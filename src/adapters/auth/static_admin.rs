//! Fixed-token admin validator for tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::ports::{AdminAuthError, AdminIdentity, AdminTokenValidator};

/// Maps literal tokens to identities. Unknown tokens are invalid.
#[derive(Debug, Default)]
pub struct StaticAdminTokenValidator {
    tokens: RwLock<HashMap<String, AdminIdentity>>,
    required_role: String,
}

impl StaticAdminTokenValidator {
    pub fn new(required_role: impl Into<String>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            required_role: required_role.into(),
        }
    }

    pub fn with_identity(self, token: impl Into<String>, subject: &str, roles: &[&str]) -> Self {
        let identity = AdminIdentity {
            subject: subject.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        match self.tokens.write() {
            Ok(mut tokens) => {
                tokens.insert(token.into(), identity);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(token.into(), identity);
            }
        }
        self
    }
}

#[async_trait]
impl AdminTokenValidator for StaticAdminTokenValidator {
    async fn validate(&self, token: &str) -> Result<AdminIdentity, AdminAuthError> {
        let identity = {
            let tokens = match self.tokens.read() {
                Ok(tokens) => tokens,
                Err(poisoned) => poisoned.into_inner(),
            };
            tokens.get(token).cloned()
        };
        let identity = identity.ok_or_else(|| AdminAuthError::InvalidToken("unknown token".into()))?;
        if !identity.has_role(&self.required_role) {
            return Err(AdminAuthError::Forbidden);
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_with_role_is_accepted() {
        let v = StaticAdminTokenValidator::new("billing_admin")
            .with_identity("t1", "ops", &["billing_admin"])
            .with_identity("t2", "viewer", &[]);

        assert_eq!(v.validate("t1").await.unwrap().subject, "ops");
        assert_eq!(v.validate("t2").await, Err(AdminAuthError::Forbidden));
        assert!(v.validate("t3").await.is_err());
    }
}
