//! The telemetry channel must never slow the acquisition loop down.

use std::time::{Duration, Instant};

use trial_daq::channels::{
    error_channel, setup_channel, telemetry_channel, SetupParameters,
};
use trial_daq::config::StorageSettings;
use trial_daq::hardware::SimulatedInertial;
use trial_daq::signals::SignalSet;
use trial_daq::sources::InertialSource;
use trial_daq::worker::AcquisitionWorker;

const ITERATIONS: usize = 2_000;

fn timed_run(capacity: usize, drain: bool) -> (Duration, u64) {
    let (setup_tx, setup_rx) = setup_channel();
    let (telemetry_tx, telemetry_rx) = telemetry_channel(capacity);
    let (errors_tx, _errors_rx) = error_channel();
    let signals = SignalSet::new();
    let mut worker = AcquisitionWorker::new(
        InertialSource::new(SimulatedInertial::new(Duration::ZERO)),
        signals.clone(),
        setup_rx,
        telemetry_tx,
        errors_tx,
        StorageSettings::default(),
    );
    setup_tx
        .publish_sensor(&SetupParameters::new("E1", "P1", "/unused"))
        .unwrap();
    signals.setup_done.set();
    assert!(worker.start());

    let start = Instant::now();
    for _ in 0..ITERATIONS {
        assert!(worker.step());
        if drain {
            telemetry_rx.latest();
        }
    }
    (start.elapsed(), telemetry_rx.dropped())
}

#[test]
fn test_absent_consumer_does_not_block_producer() {
    // Nobody ever reads: every publish after the first few must be dropped
    // rather than waited on.
    let (elapsed, dropped) = timed_run(4, false);
    assert_eq!(dropped, (ITERATIONS - 4) as u64);
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
}

#[test]
fn test_full_channel_rate_matches_drained_channel() {
    let (drained, drained_drops) = timed_run(4, true);
    let (stalled, _) = timed_run(4, false);
    assert_eq!(drained_drops, 0);
    // Generous bound: a blocking send would never finish at all.
    assert!(
        stalled < drained * 10 + Duration::from_millis(500),
        "stalled {:?} vs drained {:?}",
        stalled,
        drained
    );
}

#[test]
fn test_reader_keeps_only_newest_sample() {
    let (telemetry_tx, telemetry_rx) = telemetry_channel(128);
    let (setup_tx, setup_rx) = setup_channel();
    let (errors_tx, _errors_rx) = error_channel();
    drop(setup_tx);
    let mut worker = AcquisitionWorker::new(
        InertialSource::new(SimulatedInertial::new(Duration::ZERO)),
        SignalSet::new(),
        setup_rx,
        telemetry_tx,
        errors_tx,
        StorageSettings::default(),
    );
    assert!(worker.start());

    for _ in 0..10 {
        worker.step();
    }
    let newest = telemetry_rx.latest().unwrap();
    assert!(newest.timestamp > 0.0);
    assert!(telemetry_rx.latest().is_none());
}
