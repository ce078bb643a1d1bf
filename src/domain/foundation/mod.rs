//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the clock abstraction and error
//! types that form the vocabulary of the billing domain.

mod clock;
mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ErrorCode, ValidationError};
pub use ids::{PaymentAttemptId, ProviderId, SubscriptionId, TierId, UserId};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
