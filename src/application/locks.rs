//! Per-subscription mutual exclusion.
//!
//! Webhook application, scheduled retries and user commands may touch the
//! same subscription at once. Within one process they are serialized by a
//! lock per subscription id; across processes the repository's version
//! check catches the rest.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::foundation::SubscriptionId;

#[derive(Default)]
pub struct SubscriptionLocks {
    locks: DashMap<SubscriptionId, Arc<Mutex<()>>>,
}

impl SubscriptionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn acquire(&self, id: SubscriptionId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Forgets locks nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
