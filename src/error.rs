//! Crate-wide error type.
//!
//! Every stage validates its own inputs and reports failures through
//! [`NowcastError`]. Numeric degeneracies (zero variance, zero denominators)
//! are *not* errors: they surface as `NaN` values in the output instead.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, NowcastError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NowcastError {
    /// Two inputs that must agree in length/shape do not.
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    /// An argument or enumerated code is outside its accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `nowcast`/`summarize`/`predict` called before `fit`.
    #[error("{model} model is not fitted: call fit() first")]
    Unfitted { model: &'static str },

    /// A branch with no defined algorithm.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Duplicate key in input data (e.g. repeated (date, vintage) pair).
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    /// A linear-algebra step failed (singular system, non-PD covariance, ...).
    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl NowcastError {
    /// Process exit code used by the `nowcast` binary.
    ///
    /// - 2: bad arguments or unreadable/unwritable files
    /// - 3: data problems (shape, duplicates, not enough observations)
    /// - 4: model or numerical failures
    pub fn exit_code(&self) -> u8 {
        match self {
            NowcastError::InvalidArgument(_) | NowcastError::Io(_) => 2,
            NowcastError::ShapeMismatch { .. }
            | NowcastError::DuplicateKey(_)
            | NowcastError::InsufficientData { .. } => 3,
            NowcastError::Unfitted { .. }
            | NowcastError::NotImplemented(_)
            | NowcastError::Numerical(_) => 4,
        }
    }

    pub(crate) fn shape(context: impl Into<String>, expected: usize, got: usize) -> Self {
        NowcastError::ShapeMismatch {
            context: context.into(),
            expected,
            got,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        NowcastError::InvalidArgument(message.into())
    }
}
