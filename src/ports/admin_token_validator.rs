//! Admin token validation port.

use async_trait::async_trait;

/// Identity of an authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    /// Subject, recorded as the audit actor.
    pub subject: String,
    pub roles: Vec<String>,
}

impl AdminIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminAuthError {
    #[error("token invalid: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("missing required role")]
    Forbidden,
}

#[async_trait]
pub trait AdminTokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AdminIdentity, AdminAuthError>;
}
