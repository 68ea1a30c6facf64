//! The run summary returned by the hub.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use wheel_convergence::TerminationReason;
use wheel_fabric::{Iterate, SpokeKind};

/// What the hub knows about one spoke when the run ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpokeDiagnostics {
    pub kind: SpokeKind,
    /// The spoke acknowledged startup.
    pub ready: bool,
    /// Newest iterate sequence the spoke is known to have read.
    pub last_sequence_seen: Option<u64>,
    /// The spoke confirmed shutdown within the timeout.
    pub acknowledged_shutdown: bool,
    pub reports_received: u64,
    pub stale_reports: u64,
    /// Why the spoke stopped early, if it failed.
    pub error: Option<String>,
}

impl SpokeDiagnostics {
    pub(crate) fn new(kind: SpokeKind) -> Self {
        Self {
            kind,
            ready: false,
            last_sequence_seen: None,
            acknowledged_shutdown: false,
            reports_received: 0,
            stale_reports: 0,
            error: None,
        }
    }
}

/// Final bounds, termination reason and per-spoke diagnostics of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResult {
    /// Why the run stopped. `None` only in the partial result attached to
    /// a hub failure.
    pub termination: Option<TerminationReason>,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub relative_gap: f64,
    /// Completed hub iterations.
    pub iterations: u64,
    /// Sequence of the last published iterate.
    pub final_sequence: u64,
    /// Diagnostics keyed by spoke role name.
    pub spokes: BTreeMap<String, SpokeDiagnostics>,
    #[serde(skip)]
    pub final_iterate: Option<Iterate>,
}

impl FinalResult {
    /// Names of spokes that did not confirm shutdown.
    pub fn unresponsive(&self) -> Vec<&str> {
        self.spokes
            .iter()
            .filter(|(_, diag)| !diag.acknowledged_shutdown)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}
