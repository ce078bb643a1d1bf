//! Admin authentication adapters.
//!
//! - `jwt_admin` - HS256 bearer tokens issued by the identity service
//! - `static_admin` - Fixed tokens for tests and local development

mod jwt_admin;
mod static_admin;

pub use jwt_admin::JwtAdminTokenValidator;
pub use static_admin::StaticAdminTokenValidator;
