//! Application layer - Services, commands, queries and handlers.
//!
//! Orchestrates the billing domain over the ports:
//!
//! - `ConfigurationStore` - Audited, versioned provider and policy writes
//! - `ProviderRouter` / `HealthRegistry` - Provider selection and failover
//! - `SubscriptionStateMachine` - Serialized subscription changes
//! - `WebhookIngestor` - Exactly-once webhook application
//! - `BillingScheduler` - Retries, expiries, probes and housekeeping
//! - `handlers` - Subscriber and admin commands and queries

pub mod charging;
pub mod configuration_store;
pub mod handlers;
pub mod health;
pub mod locks;
pub mod router;
pub mod scheduler;
pub mod state_machine;
pub mod webhook_ingestor;

#[cfg(test)]
pub(crate) mod testing;

pub use charging::{ChargeOutcome, Charger};
pub use configuration_store::{ConfigurationStore, ProviderDraft, ProviderRemoval, ProviderSummary};
pub use health::{HealthRegistry, ProviderHealth};
pub use locks::SubscriptionLocks;
pub use router::{ProviderRouter, Repeat, Routed};
pub use scheduler::{BillingScheduler, SchedulerConfig, TickReport};
pub use state_machine::{AppliedEvent, LockedSubscription, SubscriptionStateMachine};
pub use webhook_ingestor::{IngestResponse, ReprocessReport, WebhookIngestor};
