//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing domain to external systems:
//! - `gateways` - Payment provider clients (card network, wallet, mock)
//! - `crypto` - Credential encryption at rest
//! - `postgres` - Durable repositories
//! - `memory` - In-process repositories for tests and database-less runs
//! - `notify` - Subscriber notifications and operator alerts
//! - `auth` - Admin token validation
//! - `http` - Axum routes for webhooks, subscribers and operators

pub mod auth;
pub mod crypto;
pub mod gateways;
pub mod http;
pub mod memory;
pub mod notify;
pub mod postgres;
