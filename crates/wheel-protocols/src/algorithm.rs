//! Seams between the coordination layer and the numerical algorithms.
//!
//! The hub and spoke loops own all communication; an algorithm only sees
//! the latest iterate (or the reports gathered for it) and returns values.
//! Algorithms run on their cylinder's own thread and never share state with
//! other cylinders except through the fabric.

use std::sync::Arc;

use wheel_fabric::{BoundKind, Control, DecisionValues, Inbox, Iterate, Report};
use wheel_scenario::ScenarioSet;

/// Error type returned by algorithm callbacks.
pub type AlgorithmError = Box<dyn std::error::Error + Send + Sync>;

/// A local bound produced by the hub's own step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalBound {
    pub kind: BoundKind,
    pub value: f64,
}

impl LocalBound {
    /// A value attained by some feasible solution.
    pub fn inner(value: f64) -> Self {
        Self {
            kind: BoundKind::Inner,
            value,
        }
    }

    /// A value no feasible solution can beat.
    pub fn outer(value: f64) -> Self {
        Self {
            kind: BoundKind::Outer,
            value,
        }
    }
}

/// Output of one hub iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct HubStep {
    /// Decision values for the next iterate.
    pub values: DecisionValues,
    /// The hub's own bound for this iteration, if it computes one.
    pub bound: Option<LocalBound>,
}

impl HubStep {
    pub fn new(values: DecisionValues) -> Self {
        Self { values, bound: None }
    }

    #[must_use]
    pub fn with_bound(mut self, bound: LocalBound) -> Self {
        self.bound = Some(bound);
        self
    }
}

/// What the hub algorithm can see.
#[derive(Debug)]
pub struct HubContext<'a> {
    pub(crate) scenarios: &'a Arc<ScenarioSet>,
    pub(crate) iteration: u64,
}

impl<'a> HubContext<'a> {
    /// A context for driving a hub algorithm outside a run.
    pub fn new(scenarios: &'a Arc<ScenarioSet>, iteration: u64) -> Self {
        Self { scenarios, iteration }
    }

    pub fn scenarios(&self) -> &Arc<ScenarioSet> {
        self.scenarios
    }

    /// Hub iterations completed before this step.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

/// What a spoke algorithm can see.
#[derive(Debug)]
pub struct SpokeContext<'a> {
    pub(crate) scenarios: &'a Arc<ScenarioSet>,
    pub(crate) name: &'a str,
    pub(crate) control: &'a Inbox<Control>,
}

impl<'a> SpokeContext<'a> {
    /// A context for driving a spoke algorithm outside a run.
    pub fn new(
        scenarios: &'a Arc<ScenarioSet>,
        name: &'a str,
        control: &'a Inbox<Control>,
    ) -> Self {
        Self {
            scenarios,
            name,
            control,
        }
    }

    pub fn scenarios(&self) -> &Arc<ScenarioSet> {
        self.scenarios
    }

    /// This spoke's role name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Whether the hub has asked everyone to stop. Long computations should
    /// check this and return early.
    pub fn should_stop(&self) -> bool {
        self.control.peek().is_some()
    }
}

/// The algorithm driven by the hub.
pub trait HubAlgorithm: Send {
    /// Values for the initial iterate (sequence 0). Defaults to an empty
    /// vector per scenario.
    fn initial_values(&mut self, ctx: &HubContext<'_>) -> Result<DecisionValues, AlgorithmError> {
        Ok(ctx
            .scenarios()
            .names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect())
    }

    /// Produce the next iterate from the current one and the spoke reports
    /// gathered since the previous step.
    fn step(
        &mut self,
        ctx: &HubContext<'_>,
        current: &Iterate,
        reports: &[Report],
    ) -> Result<HubStep, AlgorithmError>;
}

/// The algorithm driven by a spoke.
pub trait SpokeAlgorithm: Send {
    /// A bound valid before any iterate has been seen, published against
    /// sequence 0.
    fn trivial_bound(&mut self, _ctx: &SpokeContext<'_>) -> Result<Option<f64>, AlgorithmError> {
        Ok(None)
    }

    /// Compute a bound from an iterate. `None` means nothing worth reporting.
    fn step(
        &mut self,
        ctx: &SpokeContext<'_>,
        iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError>;

    /// Called between polls while no new iterate is available. A value
    /// returned here is reported against `latest`'s sequence.
    fn while_waiting(
        &mut self,
        _ctx: &SpokeContext<'_>,
        _latest: Option<&Iterate>,
    ) -> Result<Option<f64>, AlgorithmError> {
        Ok(None)
    }

    /// Last chance to report after termination is observed.
    fn finalize(&mut self, _ctx: &SpokeContext<'_>) -> Result<Option<f64>, AlgorithmError> {
        Ok(None)
    }
}
