use std::error::Error;
use std::fmt;

/// Convenience alias for results produced by coefficient construction and evaluation.
pub type Result<T> = std::result::Result<T, CoefficientError>;

/// Errors raised by coefficient construction or evaluation.
///
/// All failures are local and synchronous: a failing call aborts the current
/// evaluation and nothing is retried internally. Domain-wise branching over a
/// missing region is deliberately *not* an error; see
/// [`DomainWiseCf`](crate::structural::DomainWiseCf).
#[derive(Debug, Clone, PartialEq)]
pub enum CoefficientError {
    /// `evaluate_const` was called on a coefficient that is not provably
    /// constant in space.
    NotConstant(&'static str),
    /// The geometric dimension of the evaluation context does not match the
    /// embedding dimension expected by the coefficient.
    DimensionMismatch { expected: usize, actual: usize },
    /// The operand cannot be handled by the operation, for example a
    /// real-only math function applied to a complex coefficient, or a binary
    /// combinator over children of different shapes.
    UnsupportedOperand(String),
    /// A math function was evaluated outside its real domain,
    /// e.g. `log` of a non-positive argument.
    DomainError { function: &'static str, argument: f64 },
    /// An out-of-range component, element or region index.
    IndexError { index: usize, len: usize },
}

impl fmt::Display for CoefficientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoefficientError::NotConstant(name) => {
                write!(f, "evaluate_const called for non-constant coefficient '{}'", name)
            }
            CoefficientError::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "geometric dimension of evaluation context ({}) does not match \
                     expected embedding dimension ({})",
                    actual, expected
                )
            }
            CoefficientError::UnsupportedOperand(reason) => {
                write!(f, "unsupported operand: {}", reason)
            }
            CoefficientError::DomainError { function, argument } => {
                write!(f, "argument {} outside the real domain of '{}'", argument, function)
            }
            CoefficientError::IndexError { index, len } => {
                write!(f, "index {} out of range (length {})", index, len)
            }
        }
    }
}

impl Error for CoefficientError {}
