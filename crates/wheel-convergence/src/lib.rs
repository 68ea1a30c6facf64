//! Wheel Convergence - bound aggregation for the hub
//!
//! The hub owns a single [`ConvergenceMonitor`]. Every iteration it feeds
//! the monitor its own local bound plus whatever spoke reports arrived, and
//! asks whether to stop.
//!
//! # Bounds
//!
//! Each spoke kind is eligible for one bound: relaxations (bound improvers,
//! cut generators) give *outer* bounds, heuristics give *inner* bounds. The
//! objective [`Sense`] maps those to lower/upper. Bounds only move inward.
//!
//! # Termination
//!
//! ```text
//! cancelled        external cancel observed
//! converged        (ub - lb) / max(1, |lb|) <= rel_gap   (or ub - lb <= abs_gap)
//! iteration-limit  iteration >= max_iterations
//! ```
//!
//! Checked in that order; exactly one [`TerminationReason`] is produced.

mod error;
mod gap;
mod monitor;
mod state;

pub use error::{ConvergenceError, Result};
pub use gap::{absolute_gap, relative_gap, BoundSide, Sense};
pub use monitor::{
    BoundOrigin, BoundSource, ConvergenceCriteria, ConvergenceMonitor, Observation, ReportTally,
};
pub use state::{ConvergenceState, TerminationReason};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wheel_fabric::{BoundKind, CylinderId, Report, SpokeKind};

    #[test]
    fn gap_closes_to_convergence() {
        let mut monitor = ConvergenceMonitor::new(ConvergenceCriteria {
            max_iterations: 50,
            rel_gap: 1e-6,
            ..Default::default()
        })
        .unwrap();

        monitor.observe_report(&Report {
            from: CylinderId(1),
            kind: SpokeKind::BoundImprover,
            sequence: 0,
            value: 50.0,
            timestamp: Duration::ZERO,
        });

        let mut stopped_at = None;
        for k in 1..=50u64 {
            let upper = 50.0 + 50.0 * 0.5f64.powi(k as i32);
            monitor.observe_hub_bound(BoundKind::Inner, upper, k);
            monitor.advance();
            if let Some(reason) = monitor.decide(false) {
                assert_eq!(reason, TerminationReason::Converged);
                stopped_at = Some(k);
                break;
            }
        }
        // 50 * 2^-k / 50 <= 1e-6  <=>  k >= 20
        assert_eq!(stopped_at, Some(20));
    }
}
