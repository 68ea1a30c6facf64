//! Wheel Protocols - hub and spoke cylinders for scenario decomposition
//!
//! This crate runs the coordination layer of a decomposition: one **hub**
//! drives a primal algorithm (e.g. progressive hedging) while **spokes**
//! compute bounds, cuts or heuristic solutions against the hub's latest
//! iterate. All communication goes through the [`wheel_fabric`] topics.
//!
//! # Overview
//!
//! ## Hub
//!
//! The [`Hub`] publishes iterate 0, waits (bounded) for spokes to report
//! ready, then loops:
//!
//! - **Step**: call [`HubAlgorithm::step`] with the reports gathered so far
//! - **Publish**: the next iterate, sequence strictly increasing
//! - **Drain**: every spoke's latest report, without blocking
//! - **Decide**: ask the [`ConvergenceMonitor`] whether to stop
//!
//! On stop it publishes `Terminate`, waits (bounded) for acknowledgements
//! and returns a [`FinalResult`].
//!
//! ## Spokes
//!
//! A [`Spoke`] reads only the latest iterate, runs its [`SpokeAlgorithm`]
//! and reports the result against the iterate's sequence. Between iterates
//! it backs off exponentially ([`PollConfig`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wheel_protocols::{SpokeSpec, WheelConfig, WheelSpinner};
//! use wheel_fabric::SpokeKind;
//! use wheel_scenario::ScenarioSet;
//!
//! let scenarios = Arc::new(ScenarioSet::uniform(3)?);
//! let spinner = WheelSpinner::new(
//!     scenarios,
//!     WheelConfig::default().with_rel_gap(1e-6),
//!     ProgressiveHedging::new(1.0),
//!     vec![
//!         SpokeSpec::new("lagrangian", SpokeKind::BoundImprover, Lagrangian::default()),
//!         SpokeSpec::new("xhat", SpokeKind::Heuristic, XhatShuffle::default()),
//!     ],
//! )?;
//!
//! let cancel = spinner.cancel_handle();
//! let result = spinner.spin()?;
//! println!("{} after {} iterations", result.termination.unwrap(), result.iterations);
//! ```
//!
//! [`ConvergenceMonitor`]: wheel_convergence::ConvergenceMonitor

pub mod algorithm;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod hub;
mod poll;
pub mod result;
pub mod spoke;
pub mod wheel;

pub use algorithm::{
    AlgorithmError, HubAlgorithm, HubContext, HubStep, LocalBound, SpokeAlgorithm, SpokeContext,
};
pub use config::{PollConfig, WheelConfig};
pub use error::{CheckpointError, Error, Result};
pub use hub::Hub;
pub use result::{FinalResult, SpokeDiagnostics};
pub use spoke::{Spoke, SpokeOutcome};
pub use wheel::{SpokeSpec, WheelSpinner};

// Re-export the types every algorithm touches
pub use wheel_convergence::{Sense, TerminationReason};
pub use wheel_fabric::{BoundKind, CancelHandle, DecisionValues, Iterate, Report, SpokeKind};
