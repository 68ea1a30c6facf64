//! The spoke loop.

use std::sync::Arc;

use tracing::{debug, trace, warn};
use wheel_fabric::{AckStage, Control, Endpoint, Inbox, Iterate, Versioned};
use wheel_scenario::ScenarioSet;

use crate::algorithm::{AlgorithmError, SpokeAlgorithm, SpokeContext};
use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::poll::Backoff;

/// How a spoke finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokeOutcome {
    pub name: String,
    /// The control message that stopped the spoke.
    pub stopped_by: Control,
    pub reports_sent: u64,
    pub last_sequence_seen: Option<u64>,
}

/// An auxiliary cylinder: reads the latest iterate, reports bounds.
pub struct Spoke {
    endpoint: Endpoint,
    scenarios: Arc<ScenarioSet>,
    algorithm: Box<dyn SpokeAlgorithm>,
    poll: PollConfig,
    iterates: Inbox<Iterate>,
    control: Inbox<Control>,
    current: Option<Arc<Versioned<Iterate>>>,
    reports_sent: u64,
}

impl Spoke {
    /// Subscribe to the iterate and control topics through `endpoint`.
    pub fn new(
        endpoint: Endpoint,
        scenarios: Arc<ScenarioSet>,
        algorithm: Box<dyn SpokeAlgorithm>,
        poll: PollConfig,
    ) -> Self {
        let iterates = endpoint.subscribe_iterate();
        let control = endpoint.subscribe_control();
        Self {
            endpoint,
            scenarios,
            algorithm,
            poll,
            iterates,
            control,
            current: None,
            reports_sent: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn last_sequence_seen(&self) -> Option<u64> {
        self.current.as_ref().map(|iterate| iterate.sequence)
    }

    /// Run until the hub terminates or the run is cancelled.
    ///
    /// A failing algorithm publishes a `Failed` ack so the hub stops waiting
    /// for this spoke, and the error is returned.
    pub fn run(mut self) -> Result<SpokeOutcome> {
        debug!(spoke = self.name(), role = %self.endpoint.role(), "Spoke starting");

        match self.drive() {
            Ok(stopped_by) => {
                self.endpoint
                    .publish_ack(AckStage::Shutdown, self.last_sequence_seen())?;
                debug!(
                    spoke = self.name(),
                    ?stopped_by,
                    reports = self.reports_sent,
                    "Spoke finished"
                );
                Ok(SpokeOutcome {
                    name: self.name().to_string(),
                    stopped_by,
                    reports_sent: self.reports_sent,
                    last_sequence_seen: self.last_sequence_seen(),
                })
            }
            Err(err) => {
                warn!(spoke = self.name(), error = %err, "Spoke failed");
                if let Err(ack_err) = self
                    .endpoint
                    .publish_ack(AckStage::Failed, self.last_sequence_seen())
                {
                    warn!(spoke = self.name(), error = %ack_err, "Could not publish failure ack");
                }
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<Control> {
        let trivial = {
            let ctx = SpokeContext {
                scenarios: &self.scenarios,
                name: self.endpoint.name(),
                control: &self.control,
            };
            self.algorithm.trivial_bound(&ctx)
        };
        if let Some(value) = self.check(trivial)? {
            self.report(0, value)?;
        }
        self.endpoint.publish_ack(AckStage::Ready, None)?;

        let mut backoff = Backoff::new(self.poll);
        loop {
            if let Some(control) = self.control.peek() {
                return self.finish(**control);
            }

            if let Some(iterate) = self.iterates.poll() {
                backoff.reset();
                let sequence = iterate.sequence;
                trace!(spoke = self.name(), sequence, "New iterate");
                let value = {
                    let ctx = SpokeContext {
                        scenarios: &self.scenarios,
                        name: self.endpoint.name(),
                        control: &self.control,
                    };
                    self.algorithm.step(&ctx, &iterate)
                };
                self.current = Some(iterate);
                if let Some(value) = self.check(value)? {
                    self.report(sequence, value)?;
                }
                continue;
            }

            let value = {
                let ctx = SpokeContext {
                    scenarios: &self.scenarios,
                    name: self.endpoint.name(),
                    control: &self.control,
                };
                let latest = self.current.as_deref().map(Versioned::value);
                self.algorithm.while_waiting(&ctx, latest)
            };
            if let Some(value) = self.check(value)? {
                self.report(self.last_sequence_seen().unwrap_or(0), value)?;
            }
            backoff.idle();
        }
    }

    fn finish(&mut self, control: Control) -> Result<Control> {
        debug!(spoke = self.name(), ?control, "Stop observed");
        let value = {
            let ctx = SpokeContext {
                scenarios: &self.scenarios,
                name: self.endpoint.name(),
                control: &self.control,
            };
            self.algorithm.finalize(&ctx)
        };
        if let Some(value) = self.check(value)? {
            self.report(self.last_sequence_seen().unwrap_or(0), value)?;
        }
        Ok(control)
    }

    fn check(
        &self,
        value: std::result::Result<Option<f64>, AlgorithmError>,
    ) -> Result<Option<f64>> {
        value.map_err(|source| Error::SpokeFailed {
            spoke: self.name().to_string(),
            source,
        })
    }

    fn report(&mut self, sequence: u64, value: f64) -> Result<()> {
        self.endpoint.publish_report(sequence, value)?;
        self.reports_sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use wheel_fabric::{CylinderId, Fabric, RunTopology, SpokeKind};

    struct Constant(f64);

    impl SpokeAlgorithm for Constant {
        fn trivial_bound(
            &mut self,
            _ctx: &SpokeContext<'_>,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            Ok(Some(self.0 - 1.0))
        }

        fn step(
            &mut self,
            _ctx: &SpokeContext<'_>,
            _iterate: &Iterate,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            Ok(Some(self.0))
        }

        fn finalize(
            &mut self,
            _ctx: &SpokeContext<'_>,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            Ok(Some(self.0 + 1.0))
        }
    }

    struct Broken;

    impl SpokeAlgorithm for Broken {
        fn step(
            &mut self,
            _ctx: &SpokeContext<'_>,
            _iterate: &Iterate,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            Err("subproblem infeasible".into())
        }
    }

    /// Reports ten times the latest sequence once per iterate, only while idle.
    #[derive(Default)]
    struct Idler {
        reported: Option<u64>,
    }

    impl SpokeAlgorithm for Idler {
        fn step(
            &mut self,
            _ctx: &SpokeContext<'_>,
            _iterate: &Iterate,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            Ok(None)
        }

        fn while_waiting(
            &mut self,
            _ctx: &SpokeContext<'_>,
            latest: Option<&Iterate>,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            match latest {
                Some(iterate) if self.reported != Some(iterate.sequence) => {
                    self.reported = Some(iterate.sequence);
                    Ok(Some(iterate.sequence as f64 * 10.0))
                }
                _ => Ok(None),
            }
        }
    }

    /// Blocks in its step until asked to stop.
    struct Patient {
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    impl SpokeAlgorithm for Patient {
        fn step(
            &mut self,
            ctx: &SpokeContext<'_>,
            _iterate: &Iterate,
        ) -> std::result::Result<Option<f64>, AlgorithmError> {
            self.started.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                if ctx.should_stop() {
                    self.stopped.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err("never asked to stop".into())
        }
    }

    fn fabric() -> Arc<Fabric> {
        let topology = RunTopology::builder()
            .hub("hub")
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .build()
            .unwrap();
        Fabric::new(Arc::new(topology))
    }

    fn spoke(fabric: &Arc<Fabric>, algorithm: Box<dyn SpokeAlgorithm>) -> Spoke {
        Spoke::new(
            fabric.endpoint("lagrangian").unwrap(),
            Arc::new(ScenarioSet::uniform(2).unwrap()),
            algorithm,
            PollConfig::fast(),
        )
    }

    #[test]
    fn terminate_before_start_still_flushes_and_acks() {
        let fabric = fabric();
        let hub = fabric.endpoint("hub").unwrap();
        let mut acks = hub.subscribe_ack(CylinderId(1)).unwrap();
        hub.publish_control(Control::Terminate).unwrap();

        let outcome = spoke(&fabric, Box::new(Constant(5.0))).run().unwrap();
        assert_eq!(outcome.stopped_by, Control::Terminate);
        // trivial bound plus the final flush
        assert_eq!(outcome.reports_sent, 2);

        let report = fabric.latest_report(CylinderId(1)).unwrap().unwrap();
        assert_eq!(report.value, 6.0);
        assert_eq!(report.sequence, 0);
        assert_eq!(acks.poll().unwrap().stage, AckStage::Shutdown);
    }

    #[test]
    fn reports_against_the_iterate_it_read() {
        let fabric = fabric();
        let hub = fabric.endpoint("hub").unwrap();
        hub.publish_iterate(Iterate {
            sequence: 4,
            values: BTreeMap::new(),
        })
        .unwrap();

        let handle = std::thread::spawn({
            let spoke = spoke(&fabric, Box::new(Constant(5.0)));
            move || spoke.run()
        });

        let mut reports = hub.subscribe_report(CylinderId(1)).unwrap();
        let seen = crate::poll::wait_until(Duration::from_secs(5), PollConfig::fast(), || {
            reports.poll().is_some_and(|r| r.sequence == 4 && r.value == 5.0)
        });
        assert!(seen);

        hub.publish_control(Control::Terminate).unwrap();
        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.last_sequence_seen, Some(4));
        let ack = fabric.latest_ack(CylinderId(1)).unwrap().unwrap();
        assert_eq!(ack.last_sequence_seen, Some(4));
    }

    #[test]
    fn failing_algorithm_publishes_failed_ack() {
        let fabric = fabric();
        let hub = fabric.endpoint("hub").unwrap();
        hub.publish_iterate(Iterate::initial(BTreeMap::new())).unwrap();

        let err = spoke(&fabric, Box::new(Broken)).run().unwrap_err();
        assert!(matches!(&err, Error::SpokeFailed { spoke, .. } if spoke == "lagrangian"));
        assert!(err.to_string().contains("subproblem infeasible"));

        let ack = fabric.latest_ack(CylinderId(1)).unwrap().unwrap();
        assert_eq!(ack.stage, AckStage::Failed);
    }

    #[test]
    fn idle_reports_cite_the_last_iterate_seen() {
        let fabric = fabric();
        let hub = fabric.endpoint("hub").unwrap();
        hub.publish_iterate(Iterate {
            sequence: 2,
            values: BTreeMap::new(),
        })
        .unwrap();

        let handle = std::thread::spawn({
            let spoke = spoke(&fabric, Box::new(Idler::default()));
            move || spoke.run()
        });

        let mut reports = hub.subscribe_report(CylinderId(1)).unwrap();
        let seen = crate::poll::wait_until(Duration::from_secs(5), PollConfig::fast(), || {
            reports
                .poll()
                .is_some_and(|r| r.sequence == 2 && r.value == 20.0)
        });
        assert!(seen);

        hub.publish_control(Control::Terminate).unwrap();
        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.reports_sent, 1);
        assert_eq!(outcome.last_sequence_seen, Some(2));
    }

    #[test]
    fn long_step_observes_stop_request() {
        let fabric = fabric();
        let hub = fabric.endpoint("hub").unwrap();
        hub.publish_iterate(Iterate::initial(BTreeMap::new())).unwrap();

        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = std::thread::spawn({
            let spoke = spoke(
                &fabric,
                Box::new(Patient {
                    started: Arc::clone(&started),
                    stopped: Arc::clone(&stopped),
                }),
            );
            move || spoke.run()
        });

        let in_step = crate::poll::wait_until(Duration::from_secs(5), PollConfig::fast(), || {
            started.load(Ordering::SeqCst)
        });
        assert!(in_step);

        hub.publish_control(Control::Cancel).unwrap();
        let outcome = handle.join().unwrap().unwrap();
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(outcome.stopped_by, Control::Cancel);
    }
}
