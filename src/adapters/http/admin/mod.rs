//! Operator API: providers, policy, tiers and subscription support.

pub mod dto;
mod handlers;
mod routes;

pub use routes::admin_routes;
