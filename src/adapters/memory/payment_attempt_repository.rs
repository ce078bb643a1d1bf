use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, PaymentAttempt, PaymentOutcome};
use crate::domain::foundation::{PaymentAttemptId, SubscriptionId};
use crate::ports::PaymentAttemptRepository;

#[derive(Default)]
pub struct InMemoryPaymentAttemptRepository {
    attempts: RwLock<Vec<PaymentAttempt>>,
}

impl InMemoryPaymentAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentAttemptRepository for InMemoryPaymentAttemptRepository {
    async fn append(&self, attempt: &PaymentAttempt) -> Result<(), BillingError> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>, BillingError> {
        Ok(self.attempts.read().await.iter().find(|a| a.id == id).cloned())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn count_by_outcome(&self) -> Result<HashMap<PaymentOutcome, u64>, BillingError> {
        let mut counts = HashMap::new();
        for attempt in self.attempts.read().await.iter() {
            *counts.entry(attempt.outcome).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
