// ============================================================================
// Numeric Errors
// Error types for checked decimal arithmetic
// ============================================================================

use thiserror::Error;

/// Errors that can occur during checked decimal arithmetic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericError {
    /// Result exceeded the representable range
    #[error("arithmetic overflow: result exceeded maximum value")]
    Overflow,
    /// Result below the representable range
    #[error("arithmetic underflow: result below minimum value")]
    Underflow,
    /// Value carries more decimal places than allowed
    #[error("precision exceeded: at most {max_scale} decimal places allowed")]
    PrecisionExceeded { max_scale: u32 },
}

/// Result type alias for numeric operations
pub type NumericResult<T> = Result<T, NumericError>;
