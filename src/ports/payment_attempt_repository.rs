//! Payment attempt log port. Append-only.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::billing::{BillingError, PaymentAttempt, PaymentOutcome};
use crate::domain::foundation::{PaymentAttemptId, SubscriptionId};

#[async_trait]
pub trait PaymentAttemptRepository: Send + Sync {
    async fn append(&self, attempt: &PaymentAttempt) -> Result<(), BillingError>;

    async fn find_by_id(&self, id: PaymentAttemptId) -> Result<Option<PaymentAttempt>, BillingError>;

    /// Attempts for one subscription, oldest first.
    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError>;

    async fn count_by_outcome(&self) -> Result<HashMap<PaymentOutcome, u64>, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_attempt_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn PaymentAttemptRepository) {}
    }
}
