//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use wheel_convergence::{ConvergenceCriteria, Sense};

use crate::error::{Error, Result};

/// Idle polling contract: exponential backoff between `initial` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// First sleep after an empty poll.
    pub initial: Duration,
    /// Longest sleep between polls.
    pub max: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(50),
        }
    }
}

impl PollConfig {
    /// Short intervals for tests and small local runs.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_micros(100),
            max: Duration::from_millis(5),
        }
    }
}

/// Configuration shared by every cylinder of a run.
#[derive(Debug, Clone)]
pub struct WheelConfig {
    /// Role name of the hub.
    pub hub_name: String,

    /// Stopping rules.
    pub criteria: ConvergenceCriteria,

    /// How long the hub waits for spokes to report ready.
    pub startup_timeout: Duration,

    /// How long the hub waits for shutdown acknowledgements.
    pub shutdown_timeout: Duration,

    /// Idle polling for spokes and hub waits.
    pub poll: PollConfig,

    /// Initial iterate to start from instead of the hub algorithm's own.
    pub checkpoint_in: Option<PathBuf>,

    /// Where to write the final iterate.
    pub checkpoint_out: Option<PathBuf>,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            hub_name: "hub".to_string(),
            criteria: ConvergenceCriteria::default(),
            startup_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            poll: PollConfig::default(),
            checkpoint_in: None,
            checkpoint_out: None,
        }
    }
}

impl WheelConfig {
    #[must_use]
    pub fn with_hub_name(mut self, name: impl Into<String>) -> Self {
        self.hub_name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.criteria.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_rel_gap(mut self, tolerance: f64) -> Self {
        self.criteria.rel_gap = tolerance;
        self
    }

    #[must_use]
    pub fn with_abs_gap(mut self, tolerance: f64) -> Self {
        self.criteria.abs_gap = Some(tolerance);
        self
    }

    #[must_use]
    pub fn with_sense(mut self, sense: Sense) -> Self {
        self.criteria.sense = sense;
        self
    }

    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_checkpoint_in(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_in = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_checkpoint_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_out = Some(path.into());
        self
    }

    /// Check everything that can be checked before any cylinder starts.
    pub fn validate(&self) -> Result<()> {
        self.criteria.validate()?;
        if self.poll.initial.is_zero() {
            return Err(Error::InvalidConfig(
                "poll interval must be non-zero to avoid busy-waiting".into(),
            ));
        }
        if self.poll.max < self.poll.initial {
            return Err(Error::InvalidConfig(format!(
                "max poll interval {:?} is shorter than initial {:?}",
                self.poll.max, self.poll.initial
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = WheelConfig::default()
            .with_hub_name("ph")
            .with_max_iterations(7)
            .with_rel_gap(1e-6)
            .with_abs_gap(0.5)
            .with_sense(Sense::Maximize)
            .with_shutdown_timeout(Duration::from_millis(200))
            .with_poll(PollConfig::fast());

        assert_eq!(config.hub_name, "ph");
        assert_eq!(config.criteria.max_iterations, 7);
        assert_eq!(config.criteria.rel_gap, 1e-6);
        assert_eq!(config.criteria.abs_gap, Some(0.5));
        assert_eq!(config.criteria.sense, Sense::Maximize);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let config = WheelConfig::default().with_poll(PollConfig {
            initial: Duration::ZERO,
            max: Duration::from_millis(1),
        });
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_bad_criteria() {
        let config = WheelConfig::default().with_rel_gap(-1.0);
        assert!(matches!(config.validate(), Err(Error::Criteria(_))));
        let config = WheelConfig::default().with_max_iterations(0);
        assert!(matches!(config.validate(), Err(Error::Criteria(_))));
    }
}
