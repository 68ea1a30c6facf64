//! Error types for scenario sets.

use thiserror::Error;

/// Result type for scenario operations.
pub type Result<T> = std::result::Result<T, ScenarioError>;

/// Ways a scenario set can fail validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    /// No scenarios were supplied.
    #[error("scenario set is empty")]
    Empty,

    /// Two scenarios share a name.
    #[error("duplicate scenario name: {0}")]
    DuplicateName(String),

    /// A probability is outside `(0, 1]` or not finite.
    #[error("scenario {name} has invalid probability {probability}")]
    InvalidProbability { name: String, probability: f64 },

    /// Probabilities do not sum to one.
    #[error("scenario probabilities sum to {sum}, expected 1 (tolerance {tolerance})")]
    ProbabilitySum { sum: f64, tolerance: f64 },

    /// Bundle size is zero or does not divide the scenario count.
    #[error("bundle size {size} does not evenly divide {scenarios} scenarios")]
    InvalidBundleSize { size: usize, scenarios: usize },
}
