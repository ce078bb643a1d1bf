//! HTTP adapter for subscriber endpoints.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use routes::subscriber_routes;
