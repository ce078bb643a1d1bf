//! Injectable time source.
//!
//! Everything that compares against "now" (trial expiry, grace periods,
//! retry schedules, webhook replay windows) reads it from a [`Clock`], so
//! tests can move time forward without sleeping.

use std::sync::{Arc, RwLock};

use chrono::Duration;

use super::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests and simulations.
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        if let Ok(mut current) = self.current.write() {
            *current = to;
        }
    }

    /// Moves the clock forward by a duration.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.current.write() {
            *current = current.add_duration(by);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        match self.current.read() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
