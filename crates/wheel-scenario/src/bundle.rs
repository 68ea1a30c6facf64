//! Scenario bundles: groups of scenarios solved as one subproblem.

use crate::scenario::Scenario;

/// A named group of scenarios with their combined probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    name: String,
    members: Vec<String>,
    probabilities: Vec<f64>,
    probability: f64,
}

impl Bundle {
    pub(crate) fn from_members(name: String, members: &[Scenario]) -> Self {
        let probabilities: Vec<f64> = members.iter().map(Scenario::probability).collect();
        Self {
            name,
            members: members.iter().map(|s| s.name().to_string()).collect(),
            probability: probabilities.iter().sum(),
            probabilities,
        }
    }

    /// Bundle name (`bundle0`, `bundle1`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member scenario names, in scenario-set order.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Combined probability of the members.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Member names paired with their probability conditional on the bundle.
    pub fn conditional(&self) -> impl Iterator<Item = (&str, f64)> {
        self.members
            .iter()
            .zip(&self.probabilities)
            .map(move |(name, p)| (name.as_str(), p / self.probability))
    }
}
