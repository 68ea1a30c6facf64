//! Algorithms with scripted behaviour for end-to-end runs.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use wheel_protocols::{
    AlgorithmError, HubAlgorithm, HubContext, HubStep, Iterate, LocalBound, Report, SpokeAlgorithm,
    SpokeContext,
};
use wheel_scenario::{Scenario, ScenarioSet};

/// The three-scenario set `[0.2, 0.5, 0.3]`.
pub fn three_scenarios() -> Arc<ScenarioSet> {
    let set = ScenarioSet::new(vec![
        Scenario::new("low", 0.2),
        Scenario::new("mid", 0.5),
        Scenario::new("high", 0.3),
    ])
    .expect("valid scenario set");
    Arc::new(set)
}

/// Install logging once for a test binary; `RUST_LOG` controls verbosity.
pub fn init_logging() {
    wheel_logging::init_with_default("warn");
}

/// Hub whose inner bound after `k` iterations is `limit + scale * 2^-k`.
#[derive(Debug, Clone)]
pub struct GeometricHub {
    pub limit: f64,
    pub scale: f64,
    /// Sleep per step, so spokes get a chance to run.
    pub pause: Duration,
}

impl GeometricHub {
    pub fn new(limit: f64, scale: f64) -> Self {
        Self {
            limit,
            scale,
            pause: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

impl HubAlgorithm for GeometricHub {
    fn step(
        &mut self,
        ctx: &HubContext<'_>,
        current: &Iterate,
        _reports: &[Report],
    ) -> Result<HubStep, AlgorithmError> {
        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        let k = ctx.iteration() + 1;
        let bound = self.limit + self.scale * 0.5f64.powi(k as i32);
        Ok(HubStep::new(current.values.clone()).with_bound(LocalBound::inner(bound)))
    }
}

/// Hub that fails on a given iteration.
#[derive(Debug, Clone, Copy)]
pub struct FailingHub {
    pub fail_at: u64,
}

impl HubAlgorithm for FailingHub {
    fn step(
        &mut self,
        ctx: &HubContext<'_>,
        current: &Iterate,
        _reports: &[Report],
    ) -> Result<HubStep, AlgorithmError> {
        if ctx.iteration() == self.fail_at {
            return Err(format!("numerical trouble at iteration {}", self.fail_at).into());
        }
        thread::sleep(Duration::from_millis(1));
        Ok(HubStep::new(current.values.clone()))
    }
}

/// Hub that adds one to every value and remembers the first iterate it saw.
#[derive(Debug, Clone, Default)]
pub struct CountingHub {
    pub first_seen: Arc<Mutex<Option<Iterate>>>,
}

impl HubAlgorithm for CountingHub {
    fn initial_values(
        &mut self,
        ctx: &HubContext<'_>,
    ) -> Result<wheel_protocols::DecisionValues, AlgorithmError> {
        Ok(ctx
            .scenarios()
            .names()
            .map(|name| (name.to_string(), vec![0.0]))
            .collect())
    }

    fn step(
        &mut self,
        _ctx: &HubContext<'_>,
        current: &Iterate,
        _reports: &[Report],
    ) -> Result<HubStep, AlgorithmError> {
        let mut first = self.first_seen.lock().map_err(|_| "poisoned")?;
        if first.is_none() {
            *first = Some(current.clone());
        }
        let values = current
            .values
            .iter()
            .map(|(name, v)| (name.clone(), v.iter().map(|x| x + 1.0).collect()))
            .collect();
        Ok(HubStep::new(values))
    }
}

/// Spoke that reports the same value for every iterate, including as its
/// trivial bound.
#[derive(Debug, Clone, Copy)]
pub struct ConstantSpoke(pub f64);

impl SpokeAlgorithm for ConstantSpoke {
    fn trivial_bound(&mut self, _ctx: &SpokeContext<'_>) -> Result<Option<f64>, AlgorithmError> {
        Ok(Some(self.0))
    }

    fn step(
        &mut self,
        _ctx: &SpokeContext<'_>,
        _iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError> {
        Ok(Some(self.0))
    }
}

/// Spoke whose step never returns in time and ignores stop requests.
#[derive(Debug, Clone, Copy)]
pub struct StuckSpoke {
    pub hold: Duration,
}

impl SpokeAlgorithm for StuckSpoke {
    fn step(
        &mut self,
        _ctx: &SpokeContext<'_>,
        _iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError> {
        let until = Instant::now() + self.hold;
        while Instant::now() < until {
            thread::sleep(Duration::from_millis(10));
        }
        Ok(None)
    }
}

/// Spoke that fails on the first iterate after the initial one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSpoke;

impl SpokeAlgorithm for FailingSpoke {
    fn step(
        &mut self,
        _ctx: &SpokeContext<'_>,
        iterate: &Iterate,
    ) -> Result<Option<f64>, AlgorithmError> {
        if iterate.sequence > 0 {
            return Err("subproblem infeasible".into());
        }
        Ok(None)
    }
}
