//! Iterate checkpoints.
//!
//! A checkpoint is the JSON form of an [`Iterate`]. Reading one validates it
//! against the run's scenario set: every scenario must have values and no
//! unknown names are allowed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;
use wheel_fabric::Iterate;
use wheel_scenario::ScenarioSet;

use crate::error::{CheckpointError, Error, Result};

/// Write `iterate` to `path`.
pub fn write_iterate(path: &Path, iterate: &Iterate) -> Result<()> {
    write_inner(path, iterate).map_err(|source| Error::Checkpoint {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), sequence = iterate.sequence, "Wrote iterate checkpoint");
    Ok(())
}

/// Read an iterate from `path` and check it covers exactly `scenarios`.
pub fn read_iterate(path: &Path, scenarios: &ScenarioSet) -> Result<Iterate> {
    let iterate = read_inner(path, scenarios).map_err(|source| Error::Checkpoint {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), sequence = iterate.sequence, "Loaded iterate checkpoint");
    Ok(iterate)
}

fn write_inner(path: &Path, iterate: &Iterate) -> std::result::Result<(), CheckpointError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, iterate)?;
    writer.flush()?;
    Ok(())
}

fn read_inner(
    path: &Path,
    scenarios: &ScenarioSet,
) -> std::result::Result<Iterate, CheckpointError> {
    let iterate: Iterate = serde_json::from_reader(BufReader::new(File::open(path)?))?;

    if let Some(unknown) = iterate.values.keys().find(|name| !scenarios.contains(name)) {
        return Err(CheckpointError::UnknownScenario(unknown.clone()));
    }
    if let Some(missing) = scenarios.names().find(|name| !iterate.values.contains_key(*name)) {
        return Err(CheckpointError::MissingScenario(missing.to_string()));
    }
    Ok(iterate)
}
