//! Subscription handlers.
//!
//! ## Commands
//! - Creating a subscription (provider chosen by the router, with failover)
//! - Cancelling, at the provider first
//! - Changing tier with proration credit
//! - Reactivating a suspended subscription with a charge
//! - Refunding a recorded payment
//!
//! ## Queries
//! - A subscription with its tier and payment history

mod cancel_subscription;
mod change_tier;
mod create_subscription;
mod get_subscription;
mod reactivate_subscription;
mod refund_payment;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use change_tier::{ChangeTierCommand, ChangeTierHandler, ChangeTierResult};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use reactivate_subscription::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionResult,
};
pub use refund_payment::{RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult};

// Queries
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, GetSubscriptionResult};
