//! The convergence monitor: turns reports into bounds and a stop decision.
//!
//! # Tightening rules
//!
//! 1. A report may only tighten the bound its sender's kind is eligible
//!    for (through [`Sense::side`]).
//! 2. A bound only ever moves inward.
//! 3. A report computed against an iterate older than the one behind the
//!    current best value of its bound is *stale*: counted, never applied.
//! 4. A report that is not newer than the last one accepted from the same
//!    sender is a *replay* and leaves every piece of state untouched.
//!
//! Together these make the bounds monotonic regardless of arrival order and
//! make replays idempotent.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use wheel_fabric::{BoundKind, CylinderId, Report, SpokeKind};

use crate::error::{ConvergenceError, Result};
use crate::gap::{absolute_gap, BoundSide, Sense};
use crate::state::{ConvergenceState, TerminationReason};

/// Stopping rules for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCriteria {
    /// Stop once this many hub iterations have completed.
    pub max_iterations: u64,
    /// Relative gap tolerance.
    pub rel_gap: f64,
    /// Optional absolute gap tolerance.
    pub abs_gap: Option<f64>,
    /// Objective sense.
    pub sense: Sense,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            rel_gap: 1e-4,
            abs_gap: None,
            sense: Sense::Minimize,
        }
    }
}

impl ConvergenceCriteria {
    /// Reject tolerances that are negative or NaN and a zero iteration budget.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ConvergenceError::ZeroIterations);
        }
        if !(self.rel_gap >= 0.0) {
            return Err(ConvergenceError::InvalidTolerance {
                name: "rel_gap",
                value: self.rel_gap,
            });
        }
        if let Some(abs) = self.abs_gap {
            if !(abs >= 0.0) {
                return Err(ConvergenceError::InvalidTolerance {
                    name: "abs_gap",
                    value: abs,
                });
            }
        }
        Ok(())
    }
}

/// Who established a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundOrigin {
    Hub,
    Spoke { id: CylinderId, kind: SpokeKind },
}

impl BoundOrigin {
    /// Tag used in progress lines: `H` for the hub, the spoke's symbol otherwise.
    pub fn symbol(&self) -> char {
        match self {
            Self::Hub => 'H',
            Self::Spoke { kind, .. } => kind.symbol(),
        }
    }
}

/// Provenance of the current best value of a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundSource {
    pub origin: BoundOrigin,
    /// Iterate sequence the value was computed against.
    pub sequence: u64,
}

/// What happened to an observed bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The value moved a global bound.
    Tightened(BoundSide),
    /// Recorded, but not tighter than the current bound.
    Accepted,
    /// Computed against an iterate older than the current best's.
    Stale,
    /// Already seen from this sender; nothing changed.
    Replay,
    /// Not a number; ignored.
    Invalid,
}

/// Per-spoke bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTally {
    pub received: u64,
    pub stale: u64,
    pub replayed: u64,
    pub tightened: u64,
    /// Newest iterate sequence this spoke reported against.
    pub last_sequence_seen: Option<u64>,
}

/// Aggregates hub and spoke bounds and decides termination.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    criteria: ConvergenceCriteria,
    state: ConvergenceState,
    upper_source: Option<BoundSource>,
    lower_source: Option<BoundSource>,
    last_accepted: HashMap<CylinderId, (u64, Duration)>,
    tallies: HashMap<CylinderId, ReportTally>,
}

impl ConvergenceMonitor {
    /// Create a monitor with validated criteria.
    pub fn new(criteria: ConvergenceCriteria) -> Result<Self> {
        criteria.validate()?;
        Ok(Self {
            criteria,
            state: ConvergenceState::default(),
            upper_source: None,
            lower_source: None,
            last_accepted: HashMap::new(),
            tallies: HashMap::new(),
        })
    }

    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// Provenance of the current best value of a bound.
    pub fn source(&self, side: BoundSide) -> Option<&BoundSource> {
        match side {
            BoundSide::Upper => self.upper_source.as_ref(),
            BoundSide::Lower => self.lower_source.as_ref(),
        }
    }

    /// Bookkeeping for one spoke.
    pub fn tally(&self, id: CylinderId) -> Option<&ReportTally> {
        self.tallies.get(&id)
    }

    /// Feed a spoke report.
    pub fn observe_report(&mut self, report: &Report) -> Observation {
        let key = report.order_key();
        let tally = self.tallies.entry(report.from).or_default();

        if let Some(last) = self.last_accepted.get(&report.from) {
            if key <= *last {
                tally.replayed += 1;
                trace!(from = %report.from, sequence = report.sequence, "Ignoring replayed report");
                return Observation::Replay;
            }
        }

        self.last_accepted.insert(report.from, key);
        tally.received += 1;
        tally.last_sequence_seen = Some(
            tally
                .last_sequence_seen
                .map_or(report.sequence, |s| s.max(report.sequence)),
        );

        let origin = BoundOrigin::Spoke {
            id: report.from,
            kind: report.kind,
        };
        let observation = self.apply(origin, report.kind.bound(), report.value, report.sequence);

        let tally = self.tallies.entry(report.from).or_default();
        match observation {
            Observation::Stale => {
                tally.stale += 1;
                warn!(
                    from = %report.from,
                    sequence = report.sequence,
                    value = report.value,
                    "Stale report excluded from tightening"
                );
            }
            Observation::Tightened(_) => tally.tightened += 1,
            _ => {}
        }
        observation
    }

    /// Feed the hub's own local bound for iterate `sequence`.
    pub fn observe_hub_bound(&mut self, kind: BoundKind, value: f64, sequence: u64) -> Observation {
        self.apply(BoundOrigin::Hub, kind, value, sequence)
    }

    fn apply(
        &mut self,
        origin: BoundOrigin,
        kind: BoundKind,
        value: f64,
        sequence: u64,
    ) -> Observation {
        if value.is_nan() {
            return Observation::Invalid;
        }

        let side = self.criteria.sense.side(kind);
        let source = match side {
            BoundSide::Upper => &mut self.upper_source,
            BoundSide::Lower => &mut self.lower_source,
        };

        if source.is_some_and(|best| sequence < best.sequence) {
            return Observation::Stale;
        }

        if self.state.tighten(side, value) {
            *source = Some(BoundSource { origin, sequence });
            trace!(?side, value, sequence, symbol = %origin.symbol(), "Bound tightened");
            Observation::Tightened(side)
        } else {
            Observation::Accepted
        }
    }

    /// Count one completed hub iteration. Returns the new count.
    pub fn advance(&mut self) -> u64 {
        self.state.advance()
    }

    /// Decide whether to stop. Cancellation wins over convergence, which
    /// wins over the iteration limit.
    pub fn decide(&self, cancelled: bool) -> Option<TerminationReason> {
        if cancelled {
            return Some(TerminationReason::Cancelled);
        }
        if self.is_converged() {
            return Some(TerminationReason::Converged);
        }
        if self.state.iteration() >= self.criteria.max_iterations {
            return Some(TerminationReason::IterationLimit);
        }
        None
    }

    /// Whether either gap tolerance is met.
    pub fn is_converged(&self) -> bool {
        let upper = self.state.upper_bound();
        let lower = self.state.lower_bound();
        if self.state.relative_gap() <= self.criteria.rel_gap {
            return true;
        }
        self.criteria
            .abs_gap
            .is_some_and(|tol| absolute_gap(upper, lower) <= tol)
    }

    /// Progress tag like `"LX"`: symbols of the origins of the upper and
    /// lower bounds, `-` where none is known.
    pub fn origin_symbols(&self) -> String {
        [BoundSide::Upper, BoundSide::Lower]
            .iter()
            .map(|&side| self.source(side).map_or('-', |s| s.origin.symbol()))
            .collect()
    }
}
