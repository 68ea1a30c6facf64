//! The communication fabric shared by all cylinders of a run.
//!
//! # Topics
//!
//! | Topic | Writer | Readers |
//! |---|---|---|
//! | `Iterate` | hub | spokes |
//! | `Report(i)` | spoke `i` | hub |
//! | `Ack(i)` | spoke `i` | hub |
//! | `Control` | hub, cancel handles | everyone |
//!
//! Every data topic has exactly one writer, enforced when publishing, so
//! write races cannot occur by construction. Topics are independent
//! single-slot cells: there is no ordering between topics.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cell::{Inbox, TopicCell, Versioned};
use crate::error::{FabricError, Result};
use crate::messages::{Ack, AckStage, Control, Iterate, Report};
use crate::topology::{CylinderId, CylinderRole, RunTopology};

/// Identity of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Iterate,
    Control,
    Report(CylinderId),
    Ack(CylinderId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iterate => write!(f, "iterate"),
            Self::Control => write!(f, "control"),
            Self::Report(id) => write!(f, "report{id}"),
            Self::Ack(id) => write!(f, "ack{id}"),
        }
    }
}

#[derive(Debug, Default)]
struct SpokeTopics {
    report: Arc<TopicCell<Report>>,
    ack: Arc<TopicCell<Ack>>,
}

/// Per-run set of topic cells keyed by the run topology.
#[derive(Debug)]
pub struct Fabric {
    topology: Arc<RunTopology>,
    iterate: Arc<TopicCell<Iterate>>,
    control: Arc<TopicCell<Control>>,
    spokes: HashMap<CylinderId, SpokeTopics>,
    epoch: Instant,
}

impl Fabric {
    /// Create every topic the topology needs.
    pub fn new(topology: Arc<RunTopology>) -> Arc<Self> {
        let spokes = topology
            .spokes()
            .map(|(id, _)| (id, SpokeTopics::default()))
            .collect();

        debug!(
            hub = %topology.hub().name,
            spokes = topology.spoke_count(),
            "Created communication fabric"
        );

        Arc::new(Self {
            topology,
            iterate: Arc::new(TopicCell::new()),
            control: Arc::new(TopicCell::new()),
            spokes,
            epoch: Instant::now(),
        })
    }

    /// The topology this fabric was built from.
    pub fn topology(&self) -> &Arc<RunTopology> {
        &self.topology
    }

    /// Attach a cylinder by role name.
    pub fn endpoint(self: &Arc<Self>, name: &str) -> Result<Endpoint> {
        let id = self.topology.lookup(name)?;
        let role = self
            .topology
            .role(id)
            .map(|spec| spec.role)
            .ok_or(FabricError::CylinderUnknown(id))?;

        trace!(name, %id, %role, "Attached endpoint");

        Ok(Endpoint {
            fabric: Arc::clone(self),
            id,
            role,
        })
    }

    /// A handle that can cancel the run from outside any cylinder.
    pub fn cancel_handle(self: &Arc<Self>) -> CancelHandle {
        CancelHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Time since the fabric was created.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Latest iterate, if the hub has published one.
    pub fn latest_iterate(&self) -> Option<Arc<Versioned<Iterate>>> {
        self.iterate.latest()
    }

    /// Latest control message.
    pub fn latest_control(&self) -> Option<Arc<Versioned<Control>>> {
        self.control.latest()
    }

    /// Latest report from a spoke.
    pub fn latest_report(&self, id: CylinderId) -> Result<Option<Arc<Versioned<Report>>>> {
        Ok(self.spoke_topics(id)?.report.latest())
    }

    /// Latest handshake message from a spoke.
    pub fn latest_ack(&self, id: CylinderId) -> Result<Option<Arc<Versioned<Ack>>>> {
        Ok(self.spoke_topics(id)?.ack.latest())
    }

    fn spoke_topics(&self, id: CylinderId) -> Result<&SpokeTopics> {
        self.spokes
            .get(&id)
            .ok_or(FabricError::CylinderUnknown(id))
    }

    /// The single cylinder allowed to write a data topic.
    fn writer_of(&self, topic: Topic) -> Option<CylinderId> {
        match topic {
            Topic::Iterate => Some(CylinderId::HUB),
            Topic::Report(id) | Topic::Ack(id) => Some(id),
            Topic::Control => None,
        }
    }
}

/// A cylinder's attachment to the fabric.
#[derive(Debug, Clone)]
pub struct Endpoint {
    fabric: Arc<Fabric>,
    id: CylinderId,
    role: CylinderRole,
}

impl Endpoint {
    /// This cylinder's rank.
    pub fn id(&self) -> CylinderId {
        self.id
    }

    /// This cylinder's role.
    pub fn role(&self) -> CylinderRole {
        self.role
    }

    /// This cylinder's role name.
    pub fn name(&self) -> &str {
        self.fabric.topology.name(self.id)
    }

    /// The shared fabric.
    pub fn fabric(&self) -> &Arc<Fabric> {
        &self.fabric
    }

    fn check_writer(&self, topic: Topic) -> Result<()> {
        let allowed = match topic {
            Topic::Control => self.role == CylinderRole::Hub,
            Topic::Report(_) | Topic::Ack(_) => {
                !self.id.is_hub() && self.fabric.writer_of(topic) == Some(self.id)
            }
            Topic::Iterate => self.fabric.writer_of(topic) == Some(self.id),
        };
        if allowed {
            Ok(())
        } else {
            Err(FabricError::NotWriter {
                writer: self.name().to_string(),
                topic,
            })
        }
    }

    /// Publish a new iterate (hub only). Returns the topic version.
    pub fn publish_iterate(&self, iterate: Iterate) -> Result<u64> {
        self.check_writer(Topic::Iterate)?;
        let sequence = iterate.sequence;
        let version = self.fabric.iterate.publish(iterate);
        trace!(sequence, version, "Published iterate");
        Ok(version)
    }

    /// Publish this spoke's report against iterate `sequence`.
    ///
    /// Sequence 0 is always accepted, so a trivial bound can be reported
    /// before the initial iterate appears. Any later sequence must already
    /// be published.
    pub fn publish_report(&self, sequence: u64, value: f64) -> Result<Report> {
        let topic = Topic::Report(self.id);
        self.check_writer(topic)?;
        let CylinderRole::Spoke(kind) = self.role else {
            return Err(FabricError::NotWriter {
                writer: self.name().to_string(),
                topic,
            });
        };
        let latest = self
            .fabric
            .iterate
            .latest()
            .map_or(0, |iterate| iterate.sequence);
        if sequence > latest {
            return Err(FabricError::UnpublishedIterate { sequence, latest });
        }

        let report = Report {
            from: self.id,
            kind,
            sequence,
            value,
            timestamp: self.fabric.elapsed(),
        };
        self.fabric.spoke_topics(self.id)?.report.publish(report);
        trace!(from = %self.id, sequence, value, "Published report");
        Ok(report)
    }

    /// Publish this spoke's handshake message.
    pub fn publish_ack(&self, stage: AckStage, last_sequence_seen: Option<u64>) -> Result<()> {
        self.check_writer(Topic::Ack(self.id))?;
        self.fabric.spoke_topics(self.id)?.ack.publish(Ack {
            from: self.id,
            stage,
            last_sequence_seen,
        });
        trace!(from = %self.id, ?stage, "Published ack");
        Ok(())
    }

    /// Publish a control message (hub only; cancellation uses [`CancelHandle`]).
    pub fn publish_control(&self, control: Control) -> Result<()> {
        self.check_writer(Topic::Control)?;
        self.fabric.control.publish(control);
        debug!(?control, "Published control message");
        Ok(())
    }

    /// Subscribe to hub iterates.
    pub fn subscribe_iterate(&self) -> Inbox<Iterate> {
        Inbox::new(Arc::clone(&self.fabric.iterate))
    }

    /// Subscribe to control messages.
    pub fn subscribe_control(&self) -> Inbox<Control> {
        Inbox::new(Arc::clone(&self.fabric.control))
    }

    /// Subscribe to a spoke's reports.
    pub fn subscribe_report(&self, id: CylinderId) -> Result<Inbox<Report>> {
        Ok(Inbox::new(Arc::clone(&self.fabric.spoke_topics(id)?.report)))
    }

    /// Subscribe to a spoke's handshake messages.
    pub fn subscribe_ack(&self, id: CylinderId) -> Result<Inbox<Ack>> {
        Ok(Inbox::new(Arc::clone(&self.fabric.spoke_topics(id)?.ack)))
    }
}

/// Publishes [`Control::Cancel`] from outside the cylinders.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: Arc<TopicCell<Control>>,
}

impl CancelHandle {
    /// Request cancellation. Cylinders observe it at their next poll.
    pub fn cancel(&self) {
        debug!("Cancellation requested");
        self.control.publish(Control::Cancel);
    }

    /// Whether the latest control message is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.control
            .latest()
            .is_some_and(|c| *c.value() == Control::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SpokeKind;

    fn fabric() -> Arc<Fabric> {
        let topology = RunTopology::builder()
            .hub("ph")
            .spoke("lagrangian", SpokeKind::BoundImprover)
            .spoke("xhat", SpokeKind::Heuristic)
            .build()
            .unwrap();
        Fabric::new(Arc::new(topology))
    }

    #[test]
    fn unknown_role_is_rejected() {
        let fabric = fabric();
        assert_eq!(
            fabric.endpoint("ghost").unwrap_err(),
            FabricError::RoleUnknown("ghost".into())
        );
        assert_eq!(
            fabric.latest_report(CylinderId(7)).unwrap_err(),
            FabricError::CylinderUnknown(CylinderId(7))
        );
        let hub = fabric.endpoint("ph").unwrap();
        assert!(matches!(
            hub.subscribe_ack(CylinderId::HUB),
            Err(FabricError::CylinderUnknown(CylinderId::HUB))
        ));
    }

    #[test]
    fn only_hub_writes_iterates() {
        let fabric = fabric();
        let hub = fabric.endpoint("ph").unwrap();
        let spoke = fabric.endpoint("lagrangian").unwrap();

        assert!(hub.publish_iterate(Iterate::initial(Default::default())).is_ok());
        assert!(matches!(
            spoke.publish_iterate(Iterate::initial(Default::default())),
            Err(FabricError::NotWriter { topic: Topic::Iterate, .. })
        ));
        assert!(spoke.publish_control(Control::Terminate).is_err());
    }

    #[test]
    fn hub_cannot_publish_reports() {
        let fabric = fabric();
        let hub = fabric.endpoint("ph").unwrap();
        assert!(hub.publish_report(0, 1.0).is_err());
        assert!(hub.publish_ack(AckStage::Ready, None).is_err());
    }

    #[test]
    fn reports_are_stamped_with_sender() {
        let fabric = fabric();
        let hub = fabric.endpoint("ph").unwrap();
        let xhat = fabric.endpoint("xhat").unwrap();
        let mut inbox = hub.subscribe_report(xhat.id()).unwrap();

        let mut iterate = Iterate::initial(Default::default());
        for _ in 0..3 {
            iterate = iterate.successor(Default::default());
        }
        hub.publish_iterate(iterate).unwrap();

        let sent = xhat.publish_report(3, 12.5).unwrap();
        let got = inbox.poll().unwrap();
        assert_eq!(*got.value(), sent);
        assert_eq!(got.from, CylinderId(2));
        assert_eq!(got.kind, SpokeKind::Heuristic);
        assert_eq!(got.sequence, 3);
    }

    #[test]
    fn reports_cannot_cite_future_iterates() {
        let fabric = fabric();
        let hub = fabric.endpoint("ph").unwrap();
        let lagrangian = fabric.endpoint("lagrangian").unwrap();

        // Sequence 0 is allowed before any iterate exists.
        assert!(lagrangian.publish_report(0, 1.0).is_ok());

        hub.publish_iterate(Iterate::initial(Default::default())).unwrap();
        assert_eq!(
            lagrangian.publish_report(1000, 1.0).unwrap_err(),
            FabricError::UnpublishedIterate {
                sequence: 1000,
                latest: 0
            }
        );
        assert_eq!(
            fabric.latest_report(lagrangian.id()).unwrap().unwrap().sequence,
            0
        );
    }

    #[test]
    fn spoke_reads_latest_iterate_only() {
        let fabric = fabric();
        let hub = fabric.endpoint("ph").unwrap();
        let spoke = fabric.endpoint("lagrangian").unwrap();
        let mut inbox = spoke.subscribe_iterate();

        let mut iterate = Iterate::initial(Default::default());
        for _ in 0..5 {
            iterate = iterate.successor(Default::default());
            hub.publish_iterate(iterate.clone()).unwrap();
        }

        assert_eq!(inbox.poll().unwrap().sequence, 5);
        assert!(inbox.poll().is_none());
    }

    #[test]
    fn cancel_handle_reaches_control_topic() {
        let fabric = fabric();
        let spoke = fabric.endpoint("xhat").unwrap();
        let mut control = spoke.subscribe_control();
        let cancel = fabric.cancel_handle();

        assert!(!cancel.is_cancelled());
        cancel.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(**control.poll().unwrap(), Control::Cancel);
    }
}
