//! Resuming a run from a saved iterate.

use std::sync::Arc;

use wheel_integration_tests::{init_logging, three_scenarios, CountingHub};
use wheel_protocols::{Error, PollConfig, WheelConfig, WheelSpinner};

#[test]
fn second_run_starts_from_first_runs_final_iterate() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iterate.json");

    let first = WheelSpinner::new(
        three_scenarios(),
        WheelConfig::default()
            .with_max_iterations(3)
            .with_poll(PollConfig::fast())
            .with_checkpoint_out(&path),
        CountingHub::default(),
        vec![],
    )
    .unwrap()
    .spin()
    .unwrap();
    let saved = first.final_iterate.unwrap();
    assert_eq!(saved.get("mid"), Some(&[3.0][..]));

    let hub = CountingHub::default();
    let first_seen = Arc::clone(&hub.first_seen);
    let second = WheelSpinner::new(
        three_scenarios(),
        WheelConfig::default()
            .with_max_iterations(2)
            .with_poll(PollConfig::fast())
            .with_checkpoint_in(&path),
        hub,
        vec![],
    )
    .unwrap()
    .spin()
    .unwrap();

    let resumed = first_seen.lock().unwrap().clone().unwrap();
    assert_eq!(resumed.sequence, 0);
    assert_eq!(resumed.values, saved.values);
    assert_eq!(second.final_iterate.unwrap().get("high"), Some(&[5.0][..]));
}

#[test]
fn missing_checkpoint_fails_the_run() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();

    let result = WheelSpinner::new(
        three_scenarios(),
        WheelConfig::default()
            .with_poll(PollConfig::fast())
            .with_checkpoint_in(dir.path().join("absent.json")),
        CountingHub::default(),
        vec![],
    )
    .unwrap()
    .spin();

    assert!(matches!(result, Err(Error::Checkpoint { .. })));
}
