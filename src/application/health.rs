//! Provider health tracking.
//!
//! Fed by live calls through the router and by periodic connectivity
//! probes. An unhealthy provider is tried after every healthy one; it is
//! never removed from routing.

use dashmap::DashMap;
use serde::Serialize;

use crate::domain::foundation::{ProviderId, Timestamp};
use crate::ports::ConnectivityReport;

/// Health of one provider as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_latency_ms: Option<u64>,
    pub checked_at: Option<Timestamp>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_error: None,
            last_latency_ms: None,
            checked_at: None,
        }
    }
}

pub struct HealthRegistry {
    entries: DashMap<ProviderId, ProviderHealth>,
    unhealthy_after_failures: u32,
}

impl HealthRegistry {
    pub fn new(unhealthy_after_failures: u32) -> Self {
        Self {
            entries: DashMap::new(),
            unhealthy_after_failures: unhealthy_after_failures.max(1),
        }
    }

    /// Providers never observed count as healthy.
    pub fn is_healthy(&self, id: ProviderId) -> bool {
        self.entries.get(&id).map(|h| h.healthy).unwrap_or(true)
    }

    pub fn record_success(&self, id: ProviderId) {
        let mut entry = self.entries.entry(id).or_default();
        entry.healthy = true;
        entry.consecutive_failures = 0;
        entry.last_error = None;
    }

    /// Counts a transient failure. Returns true when this call flipped the
    /// provider to unhealthy.
    pub fn record_failure(&self, id: ProviderId, reason: &str) -> bool {
        let mut entry = self.entries.entry(id).or_default();
        entry.consecutive_failures += 1;
        entry.last_error = Some(reason.to_string());
        let was_healthy = entry.healthy;
        if entry.consecutive_failures >= self.unhealthy_after_failures {
            entry.healthy = false;
        }
        was_healthy && !entry.healthy
    }

    /// Applies a probe result. A failed probe marks the provider unhealthy
    /// at once. Returns true when the provider turned unhealthy.
    pub fn record_probe(&self, id: ProviderId, report: &ConnectivityReport, at: Timestamp) -> bool {
        let mut entry = self.entries.entry(id).or_default();
        let was_healthy = entry.healthy;
        entry.last_latency_ms = Some(report.latency_ms);
        entry.checked_at = Some(at);
        if report.success {
            entry.healthy = true;
            entry.consecutive_failures = 0;
            entry.last_error = None;
        } else {
            entry.healthy = false;
            entry.consecutive_failures += 1;
            entry.last_error = Some(report.diagnostic.clone());
        }
        was_healthy && !entry.healthy
    }

    pub fn get(&self, id: ProviderId) -> ProviderHealth {
        self.entries.get(&id).map(|h| h.clone()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<(ProviderId, ProviderHealth)> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Drops entries for providers no longer configured.
    pub fn retain(&self, known: &[ProviderId]) {
        self.entries.retain(|id, _| known.contains(id));
    }
}
