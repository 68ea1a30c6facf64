//! Scenarios and validated scenario sets.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bundle::Bundle;
use crate::error::{Result, ScenarioError};
use crate::PROBABILITY_TOLERANCE;

/// Opaque model data attached to a scenario by the modeling layer.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// One realization of uncertainty.
#[derive(Clone)]
pub struct Scenario {
    name: String,
    probability: f64,
    payload: Option<Payload>,
}

impl Scenario {
    /// Create a scenario without a payload.
    pub fn new(name: impl Into<String>, probability: f64) -> Self {
        Self {
            name: name.into(),
            probability,
            payload: None,
        }
    }

    /// Attach an opaque payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Scenario name (unique within a set).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probability of this scenario.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// The opaque payload, if any.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Downcast the payload to a concrete model type.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("probability", &self.probability)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// A validated, immutable set of scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioSet {
    scenarios: Vec<Scenario>,
    by_name: HashMap<String, usize>,
}

impl ScenarioSet {
    /// Validate and build a scenario set.
    ///
    /// Order is preserved; it determines bundle membership.
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(ScenarioError::Empty);
        }

        let mut by_name = HashMap::with_capacity(scenarios.len());
        for (index, scenario) in scenarios.iter().enumerate() {
            let p = scenario.probability;
            if !p.is_finite() || p <= 0.0 || p > 1.0 {
                return Err(ScenarioError::InvalidProbability {
                    name: scenario.name.clone(),
                    probability: p,
                });
            }
            if by_name.insert(scenario.name.clone(), index).is_some() {
                return Err(ScenarioError::DuplicateName(scenario.name.clone()));
            }
        }

        let sum: f64 = scenarios.iter().map(|s| s.probability).sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ScenarioError::ProbabilitySum {
                sum,
                tolerance: PROBABILITY_TOLERANCE,
            });
        }

        Ok(Self { scenarios, by_name })
    }

    /// `count` equally likely scenarios named `scen0`, `scen1`, ...
    pub fn uniform(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(ScenarioError::Empty);
        }
        let p = 1.0 / count as f64;
        Self::new(
            (0..count)
                .map(|i| Scenario::new(format!("scen{i}"), p))
                .collect(),
        )
    }

    /// Number of scenarios.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Always false for a validated set; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Iterate scenarios in construction order.
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    /// Scenario names in construction order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().map(|s| s.name.as_str())
    }

    /// Look up a scenario by name.
    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.by_name.get(name).map(|&i| &self.scenarios[i])
    }

    /// Whether a scenario with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Probability-weighted sum of `f` over all scenarios.
    pub fn expectation<F>(&self, mut f: F) -> f64
    where
        F: FnMut(&Scenario) -> f64,
    {
        self.scenarios.iter().map(|s| s.probability * f(s)).sum()
    }

    /// Group consecutive scenarios into bundles of exactly `size` members.
    pub fn bundles(&self, size: usize) -> Result<Vec<Bundle>> {
        if size == 0 || self.scenarios.len() % size != 0 {
            return Err(ScenarioError::InvalidBundleSize {
                size,
                scenarios: self.scenarios.len(),
            });
        }

        Ok(self
            .scenarios
            .chunks(size)
            .enumerate()
            .map(|(i, chunk)| Bundle::from_members(format!("bundle{i}"), chunk))
            .collect())
    }
}

impl<'a> IntoIterator for &'a ScenarioSet {
    type Item = &'a Scenario;
    type IntoIter = std::slice::Iter<'a, Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenarios.iter()
    }
}
