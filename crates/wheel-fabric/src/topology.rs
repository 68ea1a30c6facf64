//! Run topology: the immutable mapping from role names to cylinders.
//!
//! Built once before any cylinder starts and shared read-only. The hub is
//! always [`CylinderId::HUB`]; spokes are numbered from 1 in declaration
//! order.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, FabricError};

/// Rank of a cylinder within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CylinderId(pub usize);

impl CylinderId {
    /// The hub's rank.
    pub const HUB: CylinderId = CylinderId(0);

    /// Whether this is the hub.
    pub const fn is_hub(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CylinderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of the optimum a bound comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundKind {
    /// Objective of a feasible solution.
    Inner,
    /// Value of a relaxation.
    Outer,
}

/// Auxiliary algorithm families a spoke can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpokeKind {
    /// Relaxation-based bounds (e.g. Lagrangian).
    BoundImprover,
    /// Cut generation; its reports are relaxation values.
    CutGenerator,
    /// Candidate-solution search (e.g. xhat evaluation).
    Heuristic,
}

impl SpokeKind {
    /// The bound this kind of spoke may tighten.
    pub const fn bound(self) -> BoundKind {
        match self {
            Self::BoundImprover | Self::CutGenerator => BoundKind::Outer,
            Self::Heuristic => BoundKind::Inner,
        }
    }

    /// One-character tag used in progress lines.
    pub const fn symbol(self) -> char {
        match self {
            Self::BoundImprover => 'L',
            Self::CutGenerator => 'C',
            Self::Heuristic => 'X',
        }
    }
}

impl fmt::Display for SpokeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundImprover => write!(f, "bound-improver"),
            Self::CutGenerator => write!(f, "cut-generator"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Role of a cylinder in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CylinderRole {
    Hub,
    Spoke(SpokeKind),
}

impl fmt::Display for CylinderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hub => write!(f, "hub"),
            Self::Spoke(kind) => write!(f, "spoke({kind})"),
        }
    }
}

/// A named role declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub role: CylinderRole,
}

impl RoleSpec {
    pub fn hub(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: CylinderRole::Hub,
        }
    }

    pub fn spoke(name: impl Into<String>, kind: SpokeKind) -> Self {
        Self {
            name: name.into(),
            role: CylinderRole::Spoke(kind),
        }
    }
}

/// Immutable role registry for one run.
#[derive(Debug, Clone)]
pub struct RunTopology {
    /// Indexed by `CylinderId`; hub first.
    roles: Vec<RoleSpec>,
    by_name: HashMap<String, CylinderId>,
}

impl RunTopology {
    /// Validate role declarations and assign ranks.
    ///
    /// Requires exactly one hub and unique, non-empty names.
    pub fn new(specs: impl IntoIterator<Item = RoleSpec>) -> Result<Self, ConfigurationError> {
        let mut hub: Option<RoleSpec> = None;
        let mut spokes = Vec::new();
        let mut names = HashSet::new();

        for spec in specs {
            if spec.name.is_empty() {
                return Err(ConfigurationError::EmptyRoleName);
            }
            if !names.insert(spec.name.clone()) {
                return Err(ConfigurationError::DuplicateRole(spec.name));
            }
            match spec.role {
                CylinderRole::Hub => {
                    if let Some(first) = &hub {
                        return Err(ConfigurationError::MultipleHubs {
                            first: first.name.clone(),
                            second: spec.name,
                        });
                    }
                    hub = Some(spec);
                }
                CylinderRole::Spoke(_) => spokes.push(spec),
            }
        }

        let hub = hub.ok_or(ConfigurationError::NoHub)?;
        let roles: Vec<RoleSpec> = std::iter::once(hub).chain(spokes).collect();
        let by_name = roles
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), CylinderId(i)))
            .collect();

        Ok(Self { roles, by_name })
    }

    /// Start declaring roles.
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// Rank for a role name.
    pub fn lookup(&self, name: &str) -> Result<CylinderId, FabricError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FabricError::RoleUnknown(name.to_string()))
    }

    /// Declaration for a rank.
    pub fn role(&self, id: CylinderId) -> Option<&RoleSpec> {
        self.roles.get(id.0)
    }

    /// Name for a rank, or `"?"` when out of range.
    pub fn name(&self, id: CylinderId) -> &str {
        self.role(id).map_or("?", |spec| spec.name.as_str())
    }

    /// The hub's declaration.
    pub fn hub(&self) -> &RoleSpec {
        &self.roles[0]
    }

    /// Spokes with their ranks, in declaration order.
    pub fn spokes(&self) -> impl Iterator<Item = (CylinderId, &RoleSpec)> {
        self.roles
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, spec)| (CylinderId(i), spec))
    }

    /// Number of spokes.
    pub fn spoke_count(&self) -> usize {
        self.roles.len() - 1
    }

    /// Total number of cylinders including the hub.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Never true for a validated topology.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Incremental topology declaration.
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    specs: Vec<RoleSpec>,
}

impl TopologyBuilder {
    /// Declare the hub.
    #[must_use]
    pub fn hub(mut self, name: impl Into<String>) -> Self {
        self.specs.push(RoleSpec::hub(name));
        self
    }

    /// Declare a spoke.
    #[must_use]
    pub fn spoke(mut self, name: impl Into<String>, kind: SpokeKind) -> Self {
        self.specs.push(RoleSpec::spoke(name, kind));
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<RunTopology, ConfigurationError> {
        RunTopology::new(self.specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_is_rank_zero_regardless_of_order() {
        let topology = RunTopology::builder()
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .hub("ph")
            .spoke("xhat", SpokeKind::Heuristic)
            .build()
            .unwrap();

        assert_eq!(topology.lookup("ph").unwrap(), CylinderId::HUB);
        assert_eq!(topology.lookup("lagrangian").unwrap(), CylinderId(1));
        assert_eq!(topology.lookup("xhat").unwrap(), CylinderId(2));
        assert_eq!(topology.spoke_count(), 2);
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.name(CylinderId(2)), "xhat");
        assert_eq!(topology.name(CylinderId(9)), "?");
    }

    #[test]
    fn rejects_missing_hub() {
        let err = RunTopology::builder()
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::NoHub);
    }

    #[test]
    fn rejects_second_hub() {
        let err = RunTopology::builder().hub("a").hub("b").build().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MultipleHubs {
                first: "a".into(),
                second: "b".into()
            }
        );
    }

    #[test]
    fn rejects_duplicate_roles() {
        let err = RunTopology::builder()
            .hub("ph")
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .spoke("lagrangian", SpokeKind::Heuristic)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateRole("lagrangian".into()));
    }

    #[test]
    fn rejects_empty_names() {
        let err = RunTopology::builder().hub("").build().unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyRoleName);
    }

    #[test]
    fn unknown_role_lookup() {
        let topology = RunTopology::builder().hub("ph").build().unwrap();
        assert_eq!(
            topology.lookup("nope").unwrap_err(),
            FabricError::RoleUnknown("nope".into())
        );
    }

    #[test]
    fn spoke_kinds_target_their_bound() {
        assert_eq!(SpokeKind::BoundImprover.bound(), BoundKind::Outer);
        assert_eq!(SpokeKind::CutGenerator.bound(), BoundKind::Outer);
        assert_eq!(SpokeKind::Heuristic.bound(), BoundKind::Inner);
        assert_eq!(SpokeKind::BoundImprover.symbol(), 'L');
        assert_eq!(format!("{}", CylinderRole::Spoke(SpokeKind::Heuristic)), "spoke(heuristic)");
    }
}
