//! CLI errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown solver {0:?} (the demo model supports \"closed-form\")")]
    UnknownSolver(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Scenario(#[from] wheel_scenario::ScenarioError),

    #[error(transparent)]
    Wheel(#[from] wheel_protocols::Error),

    #[error("failed to write summary: {0}")]
    Summary(#[from] std::io::Error),

    #[error("run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, CliError>;
