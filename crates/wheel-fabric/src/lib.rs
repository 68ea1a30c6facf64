//! Wheel Fabric - shared-memory topics between hub and spoke cylinders
//!
//! Cylinders never talk to each other directly. Each one attaches an
//! [`Endpoint`] to a per-run [`Fabric`] and exchanges values through
//! topics.
//!
//! # Overwrite, not queue
//!
//! A topic is a single-slot [`TopicCell`] with a version counter. Publishing
//! replaces the slot atomically; readers see either the previous value or
//! the new one, never a mixture. An [`Inbox`] remembers the last version it
//! returned, so it only ever moves forward and can tell "nothing new" from
//! "new value".
//!
//! # Topology
//!
//! The [`RunTopology`] is validated once (exactly one hub, unique role
//! names) and shared immutably. It decides which topics exist and who may
//! write each of them.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use wheel_fabric::{Fabric, Iterate, RunTopology, SpokeKind};
//!
//! let topology = RunTopology::builder()
//!     .hub("ph")
//!     .spoke("lagrangian", SpokeKind::BoundImprover)
//!     .build()
//!     .unwrap();
//! let fabric = Fabric::new(Arc::new(topology));
//!
//! let hub = fabric.endpoint("ph").unwrap();
//! let spoke = fabric.endpoint("lagrangian").unwrap();
//!
//! let mut iterates = spoke.subscribe_iterate();
//! hub.publish_iterate(Iterate::initial(Default::default())).unwrap();
//! assert_eq!(iterates.poll().unwrap().sequence, 0);
//! ```

pub mod cell;
pub mod error;
pub mod fabric;
pub mod messages;
pub mod topology;

pub use cell::{Inbox, TopicCell, Versioned};
pub use error::{ConfigurationError, FabricError, Result};
pub use fabric::{CancelHandle, Endpoint, Fabric, Topic};
pub use messages::{Ack, AckStage, Control, DecisionValues, Iterate, Report};
pub use topology::{
    BoundKind, CylinderId, CylinderRole, RoleSpec, RunTopology, SpokeKind, TopologyBuilder,
};
