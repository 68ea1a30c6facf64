//! Error types for wheel-fabric.

use thiserror::Error;

use crate::fabric::Topic;
use crate::topology::CylinderId;

/// Result type for fabric operations.
pub type Result<T> = std::result::Result<T, FabricError>;

/// Errors raised by fabric operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    /// The named role is not part of the run topology.
    #[error("role unknown: {0}")]
    RoleUnknown(String),

    /// The cylinder id is not part of the run topology.
    #[error("cylinder {0} is not in the run topology")]
    CylinderUnknown(CylinderId),

    /// A cylinder tried to write a topic it does not own.
    #[error("{writer} is not the writer of topic {topic}")]
    NotWriter { writer: String, topic: Topic },

    /// A report cites an iterate the hub has not published.
    #[error("report against iterate {sequence}, but the latest iterate is {latest}")]
    UnpublishedIterate { sequence: u64, latest: u64 },
}

/// Topology validation failures, raised before any cylinder starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No hub was declared.
    #[error("topology has no hub")]
    NoHub,

    /// More than one hub was declared.
    #[error("topology has more than one hub: {first} and {second}")]
    MultipleHubs { first: String, second: String },

    /// Two cylinders share a role name.
    #[error("duplicate role: {0}")]
    DuplicateRole(String),

    /// A role name is empty.
    #[error("role names must not be empty")]
    EmptyRoleName,
}
