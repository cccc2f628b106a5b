// ============================================================================
// Exchange Errors
// Error taxonomy shared by the ledger, matching engine and lifecycle
// ============================================================================

use crate::domain::{OrderId, OrderStatus, UserId};
use crate::numeric::{Amount, NumericError};
use thiserror::Error;

/// Errors reported by exchange operations.
///
/// Everything except [`ExchangeError::InvariantViolation`] is a rejection of
/// the caller's request and leaves no trace in the ledger or the books.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("insufficient funds for {user_id}: required {required}, available {available}")]
    InsufficientFunds {
        user_id: UserId,
        required: Amount,
        available: Amount,
    },

    #[error("insufficient {ticker} inventory for {user_id}: required {required}, available {available}")]
    InsufficientInventory {
        user_id: UserId,
        ticker: String,
        required: Amount,
        available: Amount,
    },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("unknown user: {0}")]
    UnknownUser(UserId),

    #[error("instrument already listed: {0}")]
    DuplicateInstrument(String),

    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order {order_id} cannot change state: {reason}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        reason: &'static str,
    },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("timed out waiting for resource locks")]
    LockTimeout,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ExchangeError {
    /// True when the error signals a bug rather than a rejected request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExchangeError::InvariantViolation(_))
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        ExchangeError::InvariantViolation(message.into())
    }
}

impl From<NumericError> for ExchangeError {
    fn from(err: NumericError) -> Self {
        ExchangeError::InvariantViolation(err.to_string())
    }
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;
