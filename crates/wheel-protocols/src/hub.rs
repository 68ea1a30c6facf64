//! The hub loop.
//!
//! The hub owns the convergence monitor. Each iteration it runs one step of
//! its algorithm, publishes the resulting iterate, drains whatever reports
//! the spokes have published since, and asks the monitor whether to stop.
//! It never blocks on a spoke except during the bounded startup and
//! shutdown handshakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use wheel_convergence::{ConvergenceMonitor, TerminationReason};
use wheel_fabric::{
    Ack, AckStage, Control, CylinderId, CylinderRole, Endpoint, Inbox, Iterate, Report, SpokeKind,
};
use wheel_scenario::ScenarioSet;

use crate::algorithm::{AlgorithmError, HubAlgorithm, HubContext};
use crate::checkpoint;
use crate::config::WheelConfig;
use crate::error::{Error, Result};
use crate::poll::wait_until;
use crate::result::{FinalResult, SpokeDiagnostics};

/// Hub-side view of one spoke.
#[derive(Debug)]
struct SpokeLink {
    id: CylinderId,
    name: String,
    kind: SpokeKind,
    reports: Inbox<Report>,
    acks: Inbox<Ack>,
    ready: bool,
    shutdown: bool,
    failed: bool,
    acked_sequence: Option<u64>,
}

impl SpokeLink {
    fn refresh(&mut self) {
        if let Some(ack) = self.acks.poll() {
            self.ready = true;
            self.acked_sequence = self.acked_sequence.max(ack.last_sequence_seen);
            match ack.stage {
                AckStage::Ready => {}
                AckStage::Shutdown => self.shutdown = true,
                AckStage::Failed => self.failed = true,
            }
        }
    }

    /// Whether the spoke has stopped talking to the fabric.
    fn done(&self) -> bool {
        self.shutdown || self.failed
    }
}

/// The coordinating cylinder.
pub struct Hub {
    endpoint: Endpoint,
    scenarios: Arc<ScenarioSet>,
    algorithm: Box<dyn HubAlgorithm>,
    config: WheelConfig,
    monitor: ConvergenceMonitor,
    spokes: Vec<SpokeLink>,
    control: Inbox<Control>,
}

impl Hub {
    /// Attach to every spoke's report and ack topics.
    pub fn new(
        endpoint: Endpoint,
        scenarios: Arc<ScenarioSet>,
        algorithm: Box<dyn HubAlgorithm>,
        config: WheelConfig,
    ) -> Result<Self> {
        let monitor = ConvergenceMonitor::new(config.criteria)?;
        let topology = Arc::clone(endpoint.fabric().topology());

        let spokes = topology
            .spokes()
            .filter_map(|(id, spec)| match spec.role {
                CylinderRole::Spoke(kind) => Some((id, spec.name.clone(), kind)),
                CylinderRole::Hub => None,
            })
            .map(|(id, name, kind)| -> Result<SpokeLink> {
                Ok(SpokeLink {
                    id,
                    name,
                    kind,
                    reports: endpoint.subscribe_report(id)?,
                    acks: endpoint.subscribe_ack(id)?,
                    ready: false,
                    shutdown: false,
                    failed: false,
                    acked_sequence: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let control = endpoint.subscribe_control();

        Ok(Self {
            endpoint,
            scenarios,
            algorithm,
            config,
            monitor,
            spokes,
            control,
        })
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    /// Read-only view of the monitor.
    pub fn monitor(&self) -> &ConvergenceMonitor {
        &self.monitor
    }

    /// Drive the run to termination.
    ///
    /// Every exit path publishes `Terminate` (unless the run was cancelled)
    /// so spokes stop. A failing hub algorithm yields
    /// [`Error::HubFailed`] carrying the partial result.
    pub fn run(mut self) -> Result<FinalResult> {
        info!(
            hub = self.name(),
            spokes = self.spokes.len(),
            scenarios = self.scenarios.len(),
            max_iterations = self.config.criteria.max_iterations,
            rel_gap = self.config.criteria.rel_gap,
            "Starting hub"
        );

        match self.iterate() {
            Ok(termination) => Ok(self.shut_down(Some(termination))),
            Err(Failure::Algorithm(source)) => {
                let iteration = self.monitor.state().iteration();
                error!(hub = self.name(), iteration, error = %source, "Hub algorithm failed");
                let partial = self.shut_down(None);
                Err(Error::HubFailed {
                    hub: self.name().to_string(),
                    iteration,
                    source,
                    partial: Box::new(partial),
                })
            }
            Err(Failure::Run(err)) => {
                error!(hub = self.name(), error = %err, "Hub stopped");
                self.terminate();
                Err(err)
            }
        }
    }

    fn iterate(&mut self) -> std::result::Result<TerminationReason, Failure> {
        let mut current = self.initial_iterate()?;
        self.endpoint.publish_iterate(current.clone()).map_err(Error::from)?;
        self.await_ready();

        let mut pending = Vec::new();
        loop {
            if self.cancelled() {
                return Ok(TerminationReason::Cancelled);
            }

            let ctx = HubContext {
                scenarios: &self.scenarios,
                iteration: self.monitor.state().iteration(),
            };
            let step = self
                .algorithm
                .step(&ctx, &current, &pending)
                .map_err(Failure::Algorithm)?;
            pending.clear();

            let next = current.successor(step.values);
            self.endpoint.publish_iterate(next.clone()).map_err(Error::from)?;
            let consumed = std::mem::replace(&mut current, next).sequence;

            if let Some(bound) = step.bound {
                self.monitor.observe_hub_bound(bound.kind, bound.value, consumed);
            }
            self.drain(&mut pending);

            let iteration = self.monitor.advance();
            self.log_progress(iteration);

            if let Some(reason) = self.monitor.decide(self.cancelled()) {
                return Ok(reason);
            }
        }
    }

    fn initial_iterate(&mut self) -> std::result::Result<Iterate, Failure> {
        if let Some(path) = &self.config.checkpoint_in {
            let loaded = checkpoint::read_iterate(path, &self.scenarios)?;
            info!(path = %path.display(), "Starting from checkpointed iterate");
            return Ok(Iterate::initial(loaded.values));
        }

        let ctx = HubContext {
            scenarios: &self.scenarios,
            iteration: 0,
        };
        let values = self
            .algorithm
            .initial_values(&ctx)
            .map_err(Failure::Algorithm)?;
        Ok(Iterate::initial(values))
    }

    fn await_ready(&mut self) {
        let timeout = self.config.startup_timeout;
        let poll = self.config.poll;
        let spokes = &mut self.spokes;
        let all_ready = wait_until(timeout, poll, || {
            spokes.iter_mut().for_each(SpokeLink::refresh);
            spokes.iter().all(|s| s.ready)
        });

        if all_ready {
            debug!(hub = self.name(), "All spokes ready");
        } else {
            let missing: Vec<&str> = self
                .spokes
                .iter()
                .filter(|s| !s.ready)
                .map(|s| s.name.as_str())
                .collect();
            warn!(
                hub = self.name(),
                ?missing,
                ?timeout,
                "Spokes not ready; continuing without waiting"
            );
        }
    }

    fn cancelled(&self) -> bool {
        self.control
            .peek()
            .is_some_and(|c| **c == Control::Cancel)
    }

    /// Feed every new report to the monitor without blocking.
    fn drain(&mut self, pending: &mut Vec<Report>) {
        for spoke in &mut self.spokes {
            spoke.refresh();
            if let Some(report) = spoke.reports.poll() {
                let observation = self.monitor.observe_report(&report);
                debug!(
                    spoke = %spoke.name,
                    sequence = report.sequence,
                    value = report.value,
                    ?observation,
                    "Report"
                );
                pending.push(**report);
            }
        }
    }

    fn log_progress(&self, iteration: u64) {
        let state = self.monitor.state();
        info!(
            "{:>5} {:>14.6} {:>14.6} {:>10.4e} {}",
            iteration,
            state.upper_bound(),
            state.lower_bound(),
            state.relative_gap(),
            self.monitor.origin_symbols(),
        );
    }

    fn terminate(&self) {
        if self.cancelled() {
            return;
        }
        if let Err(err) = self.endpoint.publish_control(Control::Terminate) {
            warn!(hub = self.name(), error = %err, "Could not publish terminate");
        }
    }

    fn shut_down(&mut self, termination: Option<TerminationReason>) -> FinalResult {
        self.terminate();

        let timeout = self.config.shutdown_timeout;
        let poll = self.config.poll;
        let spokes = &mut self.spokes;
        wait_until(timeout, poll, || {
            spokes.iter_mut().for_each(SpokeLink::refresh);
            spokes.iter().all(SpokeLink::done)
        });

        // Late reports still count for bookkeeping.
        let mut late = Vec::new();
        self.drain(&mut late);

        for spoke in self.spokes.iter().filter(|s| !s.done()) {
            warn!(spoke = %spoke.name, ?timeout, "Spoke did not acknowledge shutdown");
        }

        // The hub is the only iterate writer, so the latest one is ours.
        let final_iterate = self
            .endpoint
            .fabric()
            .latest_iterate()
            .map(|iterate| iterate.value().clone());
        if let (Some(path), Some(iterate)) = (&self.config.checkpoint_out, &final_iterate) {
            if let Err(err) = checkpoint::write_iterate(path, iterate) {
                warn!(error = %err, "Could not write final iterate");
            }
        }

        let state = self.monitor.state();
        let result = FinalResult {
            termination,
            upper_bound: state.upper_bound(),
            lower_bound: state.lower_bound(),
            relative_gap: state.relative_gap(),
            iterations: state.iteration(),
            final_sequence: final_iterate.as_ref().map_or(0, |it| it.sequence),
            spokes: self.diagnostics(),
            final_iterate,
        };

        match termination {
            Some(reason) => info!(
                hub = self.name(),
                %reason,
                iterations = result.iterations,
                upper = result.upper_bound,
                lower = result.lower_bound,
                rel_gap = result.relative_gap,
                "Hub finished"
            ),
            None => debug!(hub = self.name(), "Assembled partial result"),
        }
        result
    }

    fn diagnostics(&self) -> BTreeMap<String, SpokeDiagnostics> {
        self.spokes
            .iter()
            .map(|spoke| {
                let tally = self.monitor.tally(spoke.id).copied().unwrap_or_default();
                let mut diag = SpokeDiagnostics::new(spoke.kind);
                diag.ready = spoke.ready;
                diag.last_sequence_seen = spoke.acked_sequence.max(tally.last_sequence_seen);
                diag.acknowledged_shutdown = spoke.shutdown;
                diag.reports_received = tally.received;
                diag.stale_reports = tally.stale;
                if spoke.failed {
                    diag.error = Some("spoke algorithm failed".to_string());
                }
                (spoke.name.clone(), diag)
            })
            .collect()
    }
}

/// Why the hub loop stopped early.
enum Failure {
    Algorithm(AlgorithmError),
    Run(Error),
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Run(err)
    }
}
