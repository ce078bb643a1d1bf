//! Subscription Billing - Multi-provider subscription billing engine
//!
//! Routes subscription and payment operations across configurable payment
//! providers with failover, ingests provider webhooks exactly once, and
//! drives each subscription through its lifecycle (trial, renewal, dunning,
//! suspension, cancellation) under an audited, versioned configuration.

pub mod adapters;
pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
