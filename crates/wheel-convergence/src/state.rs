//! Convergence state and termination reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::gap::{relative_gap, BoundSide};

/// Why a run stopped. Exactly one is recorded per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// The gap closed within tolerance.
    Converged,
    /// The iteration budget was exhausted.
    IterationLimit,
    /// An external cancellation was observed.
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::IterationLimit => write!(f, "iteration-limit"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Best known global bounds, owned by the hub's monitor.
///
/// Upper bound never increases, lower bound never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    upper_bound: f64,
    lower_bound: f64,
    iteration: u64,
    relative_gap: f64,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self {
            upper_bound: f64::INFINITY,
            lower_bound: f64::NEG_INFINITY,
            iteration: 0,
            relative_gap: f64::INFINITY,
        }
    }
}

impl ConvergenceState {
    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    /// Completed hub iterations.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn relative_gap(&self) -> f64 {
        self.relative_gap
    }

    /// Current value of one bound.
    pub fn bound(&self, side: BoundSide) -> f64 {
        match side {
            BoundSide::Upper => self.upper_bound,
            BoundSide::Lower => self.lower_bound,
        }
    }

    /// Move a bound if `value` is strictly tighter. Returns whether it moved.
    pub(crate) fn tighten(&mut self, side: BoundSide, value: f64) -> bool {
        let moved = match side {
            BoundSide::Upper if value < self.upper_bound => {
                self.upper_bound = value;
                true
            }
            BoundSide::Lower if value > self.lower_bound => {
                self.lower_bound = value;
                true
            }
            _ => false,
        };
        if moved {
            self.relative_gap = relative_gap(self.upper_bound, self.lower_bound);
        }
        moved
    }

    pub(crate) fn advance(&mut self) -> u64 {
        self.iteration += 1;
        self.iteration
    }
}
