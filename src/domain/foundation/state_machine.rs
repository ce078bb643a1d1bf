//! State machine trait for status enums.
//!
//! Lifecycle enums implement [`StateMachine`] by listing their outgoing edges
//! once in `valid_transitions`; membership checks and guarded transitions
//! come from the provided methods.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for InvoiceStatus {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Draft => vec![Open],
///             Open => vec![Paid, Void],
///             Paid | Void => vec![],
///         }
///     }
/// }
///
/// let next = current.transition_to(InvoiceStatus::Paid)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
