//! HS256 admin token validator.
//!
//! Operators authenticate with a bearer JWT signed by the identity service
//! using a shared secret. The token must carry the configured admin role;
//! its `sub` becomes the audit actor.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::ports::{AdminAuthError, AdminIdentity, AdminTokenValidator};

/// Claims read from an admin token.
#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    sub: String,
    iss: String,
    exp: i64,
    #[serde(default)]
    roles: Vec<String>,
}

pub struct JwtAdminTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
    required_role: String,
}

impl JwtAdminTokenValidator {
    pub fn new(secret: &[u8], issuer: &str, required_role: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            required_role: required_role.into(),
        }
    }
}

#[async_trait]
impl AdminTokenValidator for JwtAdminTokenValidator {
    async fn validate(&self, token: &str) -> Result<AdminIdentity, AdminAuthError> {
        let data = decode::<AdminClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AdminAuthError::Expired,
                ErrorKind::InvalidIssuer => {
                    tracing::warn!("admin token from unexpected issuer");
                    AdminAuthError::InvalidToken("issuer".into())
                }
                _ => {
                    tracing::warn!("admin token rejected: {}", e);
                    AdminAuthError::InvalidToken(e.to_string())
                }
            }
        })?;

        let identity = AdminIdentity {
            subject: data.claims.sub,
            roles: data.claims.roles,
        };
        if !identity.has_role(&self.required_role) {
            tracing::warn!(subject = %identity.subject, "admin token lacks required role");
            return Err(AdminAuthError::Forbidden);
        }
        Ok(identity)
    }
}

impl std::fmt::Debug for JwtAdminTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAdminTokenValidator")
            .field("required_role", &self.required_role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"admin-signing-secret";
    const ISSUER: &str = "https://id.example.com";

    fn token(sub: &str, roles: &[&str], exp_offset: i64, issuer: &str, secret: &[u8]) -> String {
        let claims = AdminClaims {
            sub: sub.into(),
            iss: issuer.into(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn validator() -> JwtAdminTokenValidator {
        JwtAdminTokenValidator::new(SECRET, ISSUER, "billing_admin")
    }

    #[tokio::test]
    async fn accepts_admin_token() {
        let t = token("ops@example.com", &["billing_admin"], 600, ISSUER, SECRET);
        let identity = validator().validate(&t).await.unwrap();
        assert_eq!(identity.subject, "ops@example.com");
    }

    #[tokio::test]
    async fn missing_role_is_forbidden() {
        let t = token("viewer@example.com", &["billing_viewer"], 600, ISSUER, SECRET);
        assert_eq!(validator().validate(&t).await, Err(AdminAuthError::Forbidden));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let t = token("ops@example.com", &["billing_admin"], -3600, ISSUER, SECRET);
        assert_eq!(validator().validate(&t).await, Err(AdminAuthError::Expired));
    }

    #[tokio::test]
    async fn wrong_issuer_or_secret_is_invalid() {
        let wrong_issuer = token("ops", &["billing_admin"], 600, "https://evil", SECRET);
        assert!(matches!(
            validator().validate(&wrong_issuer).await,
            Err(AdminAuthError::InvalidToken(_))
        ));

        let wrong_secret = token("ops", &["billing_admin"], 600, ISSUER, b"other");
        assert!(matches!(
            validator().validate(&wrong_secret).await,
            Err(AdminAuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert!(matches!(
            validator().validate("not.a.jwt").await,
            Err(AdminAuthError::InvalidToken(_))
        ));
    }
}
