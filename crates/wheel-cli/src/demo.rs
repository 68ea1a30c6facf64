//! Demonstration model: separable quadratic tracking.
//!
//! Each scenario `s` carries a target `d_s`; the first-stage decision `x`
//! minimises `E[(x - d_s)^2]`. The optimum is `x* = E[d]` with value
//! `Var(d)`, and every subproblem has a closed-form solution, so no external
//! solver is needed.
//!
//! Iterate layout: every scenario maps to `[x_s, w_s]`.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;
use wheel_protocols::{
    AlgorithmError, DecisionValues, HubAlgorithm, HubContext, HubStep, Iterate, LocalBound, Report,
    SpokeAlgorithm, SpokeContext,
};
use wheel_scenario::{Scenario, ScenarioError, ScenarioSet};

/// The only subproblem solver this model knows.
pub const SOLVER_NAME: &str = "closed-form";

/// Range the generated targets are drawn from.
const TARGET_RANGE: std::ops::Range<f64> = 0.0..100.0;

/// Scenario payload: the value the decision tracks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target(pub f64);

/// `count` equally likely scenarios with seeded random targets.
pub fn scenario_set(count: usize, seed: u64) -> Result<ScenarioSet, ScenarioError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let probability = 1.0 / count as f64;
    ScenarioSet::new(
        (0..count)
            .map(|i| {
                let target = rng.gen_range(TARGET_RANGE);
                Scenario::new(format!("scen{i}"), probability)
                    .with_payload(Arc::new(Target(target)))
            })
            .collect(),
    )
}

fn target(scenario: &Scenario) -> Result<f64, AlgorithmError> {
    scenario
        .payload_as::<Target>()
        .map(|t| t.0)
        .ok_or_else(|| format!("scenario {} has no target", scenario.name()).into())
}

/// `E[(x - d_s)^2]`.
pub fn objective(scenarios: &ScenarioSet, x: f64) -> Result<f64, AlgorithmError> {
    let mut total = 0.0;
    for scenario in scenarios {
        let d = target(scenario)?;
        total += scenario.probability() * (x - d).powi(2);
    }
    Ok(total)
}

fn component(iterate: &Iterate, scenario: &str, index: usize) -> Result<f64, AlgorithmError> {
    iterate
        .get(scenario)
        .and_then(|values| values.get(index).copied())
        .ok_or_else(|| {
            format!("iterate {} has no value {index} for {scenario}", iterate.sequence).into()
        })
}

/// Probability-weighted mean of the first component.
fn xbar(scenarios: &ScenarioSet, iterate: &Iterate) -> Result<f64, AlgorithmError> {
    let mut total = 0.0;
    for scenario in scenarios {
        total += scenario.probability() * component(iterate, scenario.name(), 0)?;
    }
    Ok(total)
}

/// Members and conditional probabilities of one subproblem.
type Group = Vec<(String, f64)>;

/// Progressive hedging over scenarios or bundles.
#[derive(Debug, Clone)]
pub struct ProgressiveHedging {
    rho: f64,
    groups: Vec<Group>,
}

impl ProgressiveHedging {
    /// Solve one subproblem per scenario, or per bundle of `bundle_size`.
    pub fn new(
        rho: f64,
        scenarios: &ScenarioSet,
        bundle_size: Option<usize>,
    ) -> Result<Self, ScenarioError> {
        let groups: Vec<Group> = match bundle_size {
            Some(size) => scenarios
                .bundles(size)?
                .iter()
                .map(|bundle| {
                    bundle
                        .conditional()
                        .map(|(name, q)| (name.to_string(), q))
                        .collect()
                })
                .collect(),
            None => scenarios
                .names()
                .map(|name| vec![(name.to_string(), 1.0)])
                .collect(),
        };
        debug!(rho, subproblems = groups.len(), "Progressive hedging configured");
        Ok(Self { rho, groups })
    }

    /// Minimise `E_B[(x - d)^2] + w_B x + rho/2 (x - xbar)^2` for each group;
    /// without `prox` the proximal term is dropped.
    fn solve(
        &self,
        scenarios: &ScenarioSet,
        w: &BTreeMap<String, f64>,
        prox: Option<f64>,
    ) -> Result<BTreeMap<String, f64>, AlgorithmError> {
        let mut x = BTreeMap::new();
        for group in &self.groups {
            let mut d_bar = 0.0;
            let mut w_bar = 0.0;
            for (name, q) in group {
                let scenario = scenarios
                    .get(name)
                    .ok_or_else(|| format!("unknown scenario {name}"))?;
                d_bar += q * target(scenario)?;
                w_bar += q * w.get(name).copied().unwrap_or(0.0);
            }
            let value = match prox {
                Some(xbar) => (2.0 * d_bar - w_bar + self.rho * xbar) / (2.0 + self.rho),
                None => d_bar - w_bar / 2.0,
            };
            for (name, _) in group {
                x.insert(name.clone(), value);
            }
        }
        Ok(x)
    }
}

fn pack(x: &BTreeMap<String, f64>, w: &BTreeMap<String, f64>) -> DecisionValues {
    x.iter()
        .map(|(name, &xs)| (name.clone(), vec![xs, w.get(name).copied().unwrap_or(0.0)]))
        .collect()
}

impl HubAlgorithm for ProgressiveHedging {
    fn initial_values(&mut self, ctx: &HubContext<'_>) -> Result<DecisionValues, AlgorithmError> {
        let w = BTreeMap::new();
        let x = self.solve(ctx.scenarios(), &w, None)?;
        Ok(pack(&x, &w))
    }

    fn step(
        &mut self,
        ctx: &HubContext<'_>,
        current: &Iterate,
        _reports: &[Report],
    ) -> Result<HubStep, AlgorithmError> {
        let scenarios = ctx.scenarios();
        let xbar = xbar(scenarios, current)?;

        let mut w = BTreeMap::new();
        for name in scenarios.names() {
            let x = component(current, name, 0)?;
            let previous = component(current, name, 1)?;
            w.insert(name.to_string(), previous + self.rho * (x - xbar));
        }

        let x = self.solve(scenarios, &w, Some(xbar))?;
        let inner = objective(scenarios, xbar)?;
        Ok(HubStep::new(pack(&x, &w)).with_bound(LocalBound::inner(inner)))
    }
}

/// Lagrangian outer bound from the hub's W, optionally taking subgradient
/// steps of its own while waiting for new W.
#[derive(Debug, Clone, Default)]
pub struct LagrangianBound {
    subgradient_while_waiting: bool,
    w: BTreeMap<String, f64>,
    waiting_steps: usize,
}

impl LagrangianBound {
    /// Subgradient steps taken per iterate while waiting.
    const MAX_WAITING_STEPS: usize = 20;

    #[must_use]
    pub fn with_subgradient_while_waiting(mut self, enabled: bool) -> Self {
        self.subgradient_while_waiting = enabled;
        self
    }

    /// `E[min_x (x - d_s)^2 + w_s x]` with W projected onto `E[w] = 0`.
    fn bound(&self, scenarios: &ScenarioSet) -> Result<f64, AlgorithmError> {
        let w_mean = scenarios.expectation(|s| self.w.get(s.name()).copied().unwrap_or(0.0));
        let mut total = 0.0;
        for scenario in scenarios {
            let w = self.w.get(scenario.name()).copied().unwrap_or(0.0) - w_mean;
            let d = target(scenario)?;
            total += scenario.probability() * (w * d - w * w / 4.0);
        }
        Ok(total)
    }
}

impl SpokeAlgorithm for LagrangianBound {
    fn trivial_bound(&mut self, ctx: &SpokeContext<'_>) -> Result<Option<f64>, AlgorithmError> {
        self.w.clear();
        self.bound(ctx.scenarios()).map(Some)
    }

    fn step(
        &mut self,
        ctx: &SpokeContext<'_>,
        iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError> {
        self.w.clear();
        for name in ctx.scenarios().names() {
            self.w.insert(name.to_string(), component(iterate, name, 1)?);
        }
        self.waiting_steps = 0;
        self.bound(ctx.scenarios()).map(Some)
    }

    fn while_waiting(
        &mut self,
        ctx: &SpokeContext<'_>,
        latest: Option<&Iterate>,
    ) -> Result<Option<f64>, AlgorithmError> {
        if !self.subgradient_while_waiting
            || latest.is_none()
            || self.waiting_steps >= Self::MAX_WAITING_STEPS
        {
            return Ok(None);
        }
        self.waiting_steps += 1;

        // Subproblem solutions x_s = d_s - w_s/2; ascend along x_s - E[x].
        let scenarios: &ScenarioSet = ctx.scenarios();
        let mut x = BTreeMap::new();
        for scenario in scenarios {
            let w = self.w.get(scenario.name()).copied().unwrap_or(0.0);
            x.insert(scenario.name().to_string(), target(scenario)? - w / 2.0);
        }
        let x_mean = scenarios.expectation(|s| x.get(s.name()).copied().unwrap_or(0.0));
        for (name, xs) in &x {
            *self.w.entry(name.clone()).or_insert(0.0) += xs - x_mean;
        }
        self.bound(scenarios).map(Some)
    }
}

/// Inner bound: evaluates `xbar` and every scenario's decision as a
/// candidate first-stage solution and reports the best.
#[derive(Debug, Clone, Copy, Default)]
pub struct XhatEvaluator;

impl SpokeAlgorithm for XhatEvaluator {
    fn step(
        &mut self,
        ctx: &SpokeContext<'_>,
        iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError> {
        let scenarios = ctx.scenarios();
        let mut best = objective(scenarios, xbar(scenarios, iterate)?)?;
        for name in scenarios.names() {
            if ctx.should_stop() {
                break;
            }
            best = best.min(objective(scenarios, component(iterate, name, 0)?)?);
        }
        Ok(Some(best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wheel_fabric::{Fabric, RunTopology, SpokeKind};

    fn variance(scenarios: &ScenarioSet) -> f64 {
        let mean = scenarios.expectation(|s| target(s).unwrap());
        scenarios.expectation(|s| (target(s).unwrap() - mean).powi(2))
    }

    #[test]
    fn targets_are_seeded() {
        let a = scenario_set(4, 7).unwrap();
        let b = scenario_set(4, 7).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(target(x).unwrap(), target(y).unwrap());
            assert!(TARGET_RANGE.contains(&target(x).unwrap()));
        }
    }

    #[test]
    fn objective_is_minimised_at_the_mean() {
        let scenarios = scenario_set(5, 1).unwrap();
        let mean = scenarios.expectation(|s| target(s).unwrap());
        let at_mean = objective(&scenarios, mean).unwrap();
        assert!((at_mean - variance(&scenarios)).abs() < 1e-9);
        assert!(objective(&scenarios, mean + 1.0).unwrap() > at_mean);
    }

    #[test]
    fn progressive_hedging_reaches_consensus() {
        let scenarios = Arc::new(scenario_set(6, 3).unwrap());
        let mut ph = ProgressiveHedging::new(1.0, &scenarios, Some(2)).unwrap();
        let ctx = HubContext::new(&scenarios, 0);

        let mut iterate = Iterate::initial(ph.initial_values(&ctx).unwrap());
        for _ in 0..200 {
            let step = ph.step(&ctx, &iterate, &[]).unwrap();
            iterate = iterate.successor(step.values);
        }

        let mean = scenarios.expectation(|s| target(s).unwrap());
        for name in scenarios.names() {
            assert!((component(&iterate, name, 0).unwrap() - mean).abs() < 1e-6);
        }
        // Bundle members share one decision.
        assert_eq!(
            component(&iterate, "scen0", 0).unwrap(),
            component(&iterate, "scen1", 0).unwrap()
        );
    }

    #[test]
    fn lagrangian_bound_is_valid_and_tight_at_optimal_w() {
        let scenarios = scenario_set(4, 11).unwrap();
        let mean = scenarios.expectation(|s| target(s).unwrap());
        let optimum = variance(&scenarios);

        let mut lagrangian = LagrangianBound::default();
        assert!(lagrangian.bound(&scenarios).unwrap() <= optimum);

        // Arbitrary W still gives a valid outer bound.
        for (i, name) in scenarios.names().enumerate() {
            lagrangian.w.insert(name.to_string(), i as f64 * 3.0 - 4.0);
        }
        assert!(lagrangian.bound(&scenarios).unwrap() <= optimum + 1e-9);

        // W* = 2 (d - x*) closes the gap.
        for scenario in &scenarios {
            lagrangian
                .w
                .insert(scenario.name().to_string(), 2.0 * (target(scenario).unwrap() - mean));
        }
        assert!((lagrangian.bound(&scenarios).unwrap() - optimum).abs() < 1e-9);
    }

    #[test]
    fn subgradient_steps_while_waiting_keep_the_bound_valid() {
        let scenarios = Arc::new(scenario_set(4, 5).unwrap());
        let optimum = variance(&scenarios);

        let topology = RunTopology::builder()
            .hub("ph")
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .build()
            .unwrap();
        let fabric = Fabric::new(Arc::new(topology));
        let control = fabric.endpoint("lagrangian").unwrap().subscribe_control();
        let ctx = SpokeContext::new(&scenarios, "lagrangian", &control);

        let mut lagrangian = LagrangianBound::default().with_subgradient_while_waiting(true);
        assert_eq!(lagrangian.while_waiting(&ctx, None).unwrap(), None);

        let values = scenarios
            .names()
            .map(|name| (name.to_string(), vec![0.0, 0.0]))
            .collect();
        let iterate = Iterate::initial(values);
        let mut previous = lagrangian.step(&ctx, &iterate).unwrap().unwrap();
        for _ in 0..LagrangianBound::MAX_WAITING_STEPS {
            let bound = lagrangian
                .while_waiting(&ctx, Some(&iterate))
                .unwrap()
                .unwrap();
            assert!(bound <= optimum + 1e-9);
            assert!(bound >= previous - 1e-9);
            previous = bound;
        }
        assert!((previous - optimum).abs() < 1e-6);

        // The per-iterate budget is spent until the next iterate arrives.
        assert_eq!(lagrangian.while_waiting(&ctx, Some(&iterate)).unwrap(), None);
        lagrangian.step(&ctx, &iterate).unwrap();
        assert!(lagrangian
            .while_waiting(&ctx, Some(&iterate))
            .unwrap()
            .is_some());
    }

    #[test]
    fn waiting_steps_are_off_by_default() {
        let scenarios = Arc::new(scenario_set(3, 2).unwrap());
        let topology = RunTopology::builder()
            .hub("ph")
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .build()
            .unwrap();
        let fabric = Fabric::new(Arc::new(topology));
        let control = fabric.endpoint("lagrangian").unwrap().subscribe_control();
        let ctx = SpokeContext::new(&scenarios, "lagrangian", &control);

        let values = scenarios
            .names()
            .map(|name| (name.to_string(), vec![0.0, 0.0]))
            .collect();
        let iterate = Iterate::initial(values);
        let mut lagrangian = LagrangianBound::default();
        lagrangian.step(&ctx, &iterate).unwrap();
        assert_eq!(lagrangian.while_waiting(&ctx, Some(&iterate)).unwrap(), None);
    }

    #[test]
    fn rejects_bundles_that_do_not_divide() {
        let scenarios = scenario_set(5, 0).unwrap();
        assert!(matches!(
            ProgressiveHedging::new(1.0, &scenarios, Some(2)),
            Err(ScenarioError::InvalidBundleSize { size: 2, scenarios: 5 })
        ));
    }
}
