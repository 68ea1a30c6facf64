//! Assembling and spinning a wheel: one hub plus its spokes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use wheel_fabric::{CancelHandle, Control, Fabric, RunTopology, SpokeKind};
use wheel_scenario::ScenarioSet;

use crate::algorithm::{HubAlgorithm, SpokeAlgorithm};
use crate::config::WheelConfig;
use crate::error::{Error, Result};
use crate::hub::Hub;
use crate::result::FinalResult;
use crate::spoke::{Spoke, SpokeOutcome};

/// A spoke to attach to the wheel.
pub struct SpokeSpec {
    name: String,
    kind: SpokeKind,
    algorithm: Box<dyn SpokeAlgorithm>,
}

impl SpokeSpec {
    pub fn new(
        name: impl Into<String>,
        kind: SpokeKind,
        algorithm: impl SpokeAlgorithm + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            algorithm: Box::new(algorithm),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpokeKind {
        self.kind
    }
}

/// Owns a run: validates the configuration, builds the fabric, runs every
/// spoke on its own named thread and the hub on the calling thread.
pub struct WheelSpinner {
    scenarios: Arc<ScenarioSet>,
    config: WheelConfig,
    fabric: Arc<Fabric>,
    hub: Box<dyn HubAlgorithm>,
    spokes: Vec<SpokeSpec>,
}

impl WheelSpinner {
    /// Validate everything that can fail before a thread starts.
    pub fn new(
        scenarios: Arc<ScenarioSet>,
        config: WheelConfig,
        hub: impl HubAlgorithm + 'static,
        spokes: Vec<SpokeSpec>,
    ) -> Result<Self> {
        config.validate()?;

        let topology = spokes
            .iter()
            .fold(RunTopology::builder().hub(&config.hub_name), |builder, spoke| {
                builder.spoke(&spoke.name, spoke.kind)
            })
            .build()?;
        let fabric = Fabric::new(Arc::new(topology));

        Ok(Self {
            scenarios,
            config,
            fabric,
            hub: Box::new(hub),
            spokes,
        })
    }

    /// Cancels the run from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.fabric.cancel_handle()
    }

    pub fn topology(&self) -> &Arc<RunTopology> {
        self.fabric.topology()
    }

    /// Run to termination and return the summary.
    ///
    /// Spokes that confirm shutdown (or fail) are joined and their errors
    /// recorded; spokes that stay silent are detached so an unresponsive
    /// algorithm cannot hold the caller.
    pub fn spin(self) -> Result<FinalResult> {
        let hub_endpoint = self.fabric.endpoint(&self.config.hub_name)?;
        let spoke_endpoints = self
            .spokes
            .iter()
            .map(|spec| self.fabric.endpoint(&spec.name))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Subscribe before any spoke can publish.
        let hub = Hub::new(
            hub_endpoint.clone(),
            Arc::clone(&self.scenarios),
            self.hub,
            self.config.clone(),
        )?;

        let mut handles = Vec::with_capacity(self.spokes.len());
        for (spec, endpoint) in self.spokes.into_iter().zip(spoke_endpoints) {
            let spoke = Spoke::new(
                endpoint,
                Arc::clone(&self.scenarios),
                spec.algorithm,
                self.config.poll,
            );
            let spawned = thread::Builder::new()
                .name(format!("wheel-spoke-{}", spec.name))
                .spawn(move || spoke.run());
            match spawned {
                Ok(handle) => {
                    debug!(spoke = %spec.name, kind = %spec.kind, "Spawned spoke");
                    handles.push((spec.name, handle));
                }
                Err(source) => {
                    if let Err(err) = hub_endpoint.publish_control(Control::Terminate) {
                        warn!(error = %err, "Could not stop spokes after spawn failure");
                    }
                    return Err(Error::Spawn {
                        name: spec.name,
                        source,
                    });
                }
            }
        }

        match hub.run() {
            Ok(mut result) => {
                collect(handles, &mut result);
                Ok(result)
            }
            Err(Error::HubFailed {
                hub,
                iteration,
                source,
                mut partial,
            }) => {
                collect(handles, &mut partial);
                Err(Error::HubFailed {
                    hub,
                    iteration,
                    source,
                    partial,
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Join finished spokes and fold their errors into the diagnostics.
fn collect(handles: Vec<(String, JoinHandle<Result<SpokeOutcome>>)>, result: &mut FinalResult) {
    for (name, handle) in handles {
        let Some(diag) = result.spokes.get_mut(&name) else {
            continue;
        };
        if !(diag.acknowledged_shutdown || diag.error.is_some() || handle.is_finished()) {
            warn!(spoke = %name, "Detaching unresponsive spoke thread");
            continue;
        }
        match handle.join() {
            Ok(Ok(outcome)) => {
                debug!(spoke = %name, reports = outcome.reports_sent, "Joined spoke");
            }
            Ok(Err(Error::SpokeFailed { source, .. })) => diag.error = Some(source.to_string()),
            Ok(Err(err)) => diag.error = Some(err.to_string()),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "spoke panicked".to_string());
                warn!(spoke = %name, %message, "Spoke panicked");
                diag.error = Some(message);
            }
        }
    }
}
