//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Encryption key must be base64 encoding of 32 bytes")]
    InvalidEncryptionKey,

    #[error("Interval {0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("{0} is out of range")]
    OutOfRange(&'static str),

    #[error("Admin JWT secret must be at least 32 bytes")]
    WeakJwtSecret,

    #[error("Gateway URL must use HTTPS in production: {0}")]
    GatewayUrlMustBeHttps(&'static str),
}
