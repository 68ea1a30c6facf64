//! Payloads carried on the fabric's topics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::topology::{CylinderId, SpokeKind};

/// Per-scenario decision values.
pub type DecisionValues = BTreeMap<String, Vec<f64>>;

/// A versioned snapshot of the hub's state under decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iterate {
    /// Strictly increasing; the initial iterate is 0.
    pub sequence: u64,
    /// Decision values keyed by scenario name.
    pub values: DecisionValues,
}

impl Iterate {
    /// The iterate published before the first hub step.
    pub fn initial(values: DecisionValues) -> Self {
        Self {
            sequence: 0,
            values,
        }
    }

    /// The iterate that follows this one.
    pub fn successor(&self, values: DecisionValues) -> Self {
        Self {
            sequence: self.sequence + 1,
            values,
        }
    }

    /// Values for one scenario.
    pub fn get(&self, scenario: &str) -> Option<&[f64]> {
        self.values.get(scenario).map(Vec::as_slice)
    }
}

/// A spoke's result computed against a specific iterate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub from: CylinderId,
    pub kind: SpokeKind,
    /// Sequence of the iterate this value was computed against.
    pub sequence: u64,
    pub value: f64,
    /// Time since the fabric was created.
    pub timestamp: Duration,
}

impl Report {
    /// Ordering key used to detect replays from one sender.
    pub fn order_key(&self) -> (u64, Duration) {
        (self.sequence, self.timestamp)
    }
}

/// Messages on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Control {
    /// The hub has decided to stop; spokes flush and acknowledge.
    Terminate,
    /// External cancellation; every cylinder stops at its next poll.
    Cancel,
}

/// Handshake stage a spoke acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStage {
    /// Startup finished; the spoke is polling for iterates.
    Ready,
    /// Terminate observed; the spoke has flushed and is exiting.
    Shutdown,
    /// The spoke's algorithm failed; it is exiting without a final report.
    Failed,
}

/// A spoke's handshake message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub from: CylinderId,
    pub stage: AckStage,
    /// Sequence of the newest iterate the spoke has read.
    pub last_sequence_seen: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_increments_sequence() {
        let first = Iterate::initial(BTreeMap::from([("scen0".to_string(), vec![1.0])]));
        assert_eq!(first.sequence, 0);

        let second = first.successor(BTreeMap::from([("scen0".to_string(), vec![2.0])]));
        assert_eq!(second.sequence, 1);
        assert_eq!(second.get("scen0"), Some(&[2.0][..]));
        assert_eq!(second.get("scen9"), None);
    }

    #[test]
    fn order_key_compares_sequence_then_time() {
        let report = |sequence, millis| Report {
            from: CylinderId(1),
            kind: SpokeKind::BoundImprover,
            sequence,
            value: 0.0,
            timestamp: Duration::from_millis(millis),
        };
        assert!(report(2, 1).order_key() > report(1, 50).order_key());
        assert!(report(2, 10).order_key() > report(2, 5).order_key());
    }
}
