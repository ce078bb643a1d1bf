//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, money, timestamps, clock, errors)
//! - `billing` - Providers, policy, tiers, subscription lifecycle, webhook records

pub mod billing;
pub mod foundation;
