//! Error types for wheel-protocols.

use std::path::PathBuf;

use thiserror::Error;
use wheel_convergence::ConvergenceError;
use wheel_fabric::{ConfigurationError, FabricError};
use wheel_scenario::ScenarioError;

use crate::algorithm::AlgorithmError;
use crate::result::FinalResult;

/// Result type for wheel-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a run or a cylinder.
#[derive(Debug, Error)]
pub enum Error {
    /// The role declarations are invalid.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The scenario set or bundling is invalid.
    #[error("configuration error: {0}")]
    Scenario(#[from] ScenarioError),

    /// The stopping rules are invalid.
    #[error("configuration error: {0}")]
    Criteria(#[from] ConvergenceError),

    /// A timeout or interval is unusable.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// A fabric operation failed.
    #[error("fabric error: {0}")]
    Fabric(#[from] FabricError),

    /// The hub's algorithm failed; the run cannot continue. `partial`
    /// holds the bounds and spoke diagnostics gathered so far.
    #[error("hub {hub} failed at iteration {iteration}: {source}")]
    HubFailed {
        hub: String,
        iteration: u64,
        #[source]
        source: AlgorithmError,
        partial: Box<FinalResult>,
    },

    /// A spoke's algorithm failed; the hub carries on without it.
    #[error("spoke {spoke} failed: {source}")]
    SpokeFailed {
        spoke: String,
        #[source]
        source: AlgorithmError,
    },

    /// Reading or writing an iterate checkpoint failed.
    #[error("checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: CheckpointError,
    },

    /// A cylinder thread could not be started.
    #[error("failed to spawn cylinder {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Checkpoint failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed checkpoint: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint has no values for scenario {0}")]
    MissingScenario(String),

    #[error("checkpoint names unknown scenario {0}")]
    UnknownScenario(String),
}
