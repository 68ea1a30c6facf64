//! Wheel Scenario Sets
//!
//! An immutable enumeration of named scenarios with probabilities, shared
//! read-only by every cylinder of a run.
//!
//! # Invariants
//!
//! - At least one scenario
//! - Scenario names are unique
//! - Every probability lies in `(0, 1]`
//! - Probabilities sum to one within [`PROBABILITY_TOLERANCE`]
//!
//! A [`ScenarioSet`] is validated once at construction and never mutated,
//! so it can be shared behind an `Arc` without locking.
//!
//! # Bundles
//!
//! Scenarios can be grouped into [`Bundle`]s of equal size. A bundle is
//! solved as one subproblem; its probability is the sum of its members.

mod bundle;
mod error;
mod scenario;

pub use bundle::Bundle;
pub use error::{ScenarioError, Result};
pub use scenario::{Payload, Scenario, ScenarioSet};

/// Allowed deviation of the probability sum from one.
///
/// Deliberately tight: a set that is off by more than floating-point noise
/// is rejected rather than silently renormalised.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_tight() {
        assert!(PROBABILITY_TOLERANCE < 1e-6);
        assert!(PROBABILITY_TOLERANCE > f64::EPSILON);
    }
}
