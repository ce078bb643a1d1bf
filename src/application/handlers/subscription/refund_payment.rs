//! RefundPaymentHandler - Refunds a recorded successful charge.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::domain::foundation::{Money, PaymentAttemptId, ProviderId, ValidationError};
use crate::ports::PaymentAttemptRepository;

use crate::application::router::{ProviderRouter, Repeat};

#[derive(Debug, Clone)]
pub struct RefundPaymentCommand {
    pub payment_id: PaymentAttemptId,
    /// Partial amount; the full charge when absent.
    pub amount: Option<Money>,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundPaymentResult {
    pub payment_id: PaymentAttemptId,
    pub provider_id: ProviderId,
    pub refund_ref: String,
    pub amount: Money,
}

/// Handler for refunds.
///
/// The refund goes to the provider that took the payment, even when that
/// provider has since been disabled.
pub struct RefundPaymentHandler {
    attempts: Arc<dyn PaymentAttemptRepository>,
    router: Arc<ProviderRouter>,
}

impl RefundPaymentHandler {
    pub fn new(attempts: Arc<dyn PaymentAttemptRepository>, router: Arc<ProviderRouter>) -> Self {
        Self { attempts, router }
    }

    pub async fn handle(&self, cmd: RefundPaymentCommand) -> Result<RefundPaymentResult, BillingError> {
        let payment = self
            .attempts
            .find_by_id(cmd.payment_id)
            .await?
            .ok_or_else(|| BillingError::PaymentNotFound(cmd.payment_id.to_string()))?;

        let payment_ref = match (&payment.payment_ref, payment.succeeded()) {
            (Some(payment_ref), true) => payment_ref.clone(),
            _ => {
                return Err(ValidationError::invalid_format(
                    "payment_id",
                    "only successful provider charges can be refunded",
                )
                .into())
            }
        };

        let amount = cmd.amount.unwrap_or_else(|| payment.amount.clone());
        if amount.currency != payment.amount.currency {
            return Err(ValidationError::invalid_format("amount", "currency differs from the charge").into());
        }
        if amount.amount_minor <= 0 || amount.amount_minor > payment.amount.amount_minor {
            return Err(ValidationError::out_of_range(
                "amount",
                1,
                payment.amount.amount_minor,
                amount.amount_minor,
            )
            .into());
        }

        let routed = self
            .router
            .execute_on(payment.provider_id, "refund", Repeat::Transient, |gateway| {
                let payment_ref = payment_ref.clone();
                let amount = amount.clone();
                async move { gateway.refund(&payment_ref, &amount).await }
            })
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            provider_id = %payment.provider_id,
            refund_ref = %routed.value.refund_ref,
            amount_minor = amount.amount_minor,
            actor = %cmd.actor,
            "payment refunded"
        );
        Ok(RefundPaymentResult {
            payment_id: payment.id,
            provider_id: payment.provider_id,
            refund_ref: routed.value.refund_ref,
            amount,
        })
    }
}
