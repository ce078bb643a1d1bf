//! HTTP middleware for axum.
//!
//! - `auth` - Admin token middleware and identity extractors

pub mod auth;

pub use auth::{
    admin_auth_middleware, AdminAuthState, AuthRejection, RequireAdmin, SubscriberIdentity, USER_ID_HEADER,
};
