//! Error types for wheel-convergence.

use thiserror::Error;

/// Result type for convergence operations.
pub type Result<T> = std::result::Result<T, ConvergenceError>;

/// Invalid stopping rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvergenceError {
    /// A gap tolerance is negative or NaN.
    #[error("invalid {name} tolerance: {value}")]
    InvalidTolerance { name: &'static str, value: f64 },

    /// The iteration budget is zero.
    #[error("max_iterations must be at least 1")]
    ZeroIterations,
}
