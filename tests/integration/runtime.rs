//! Runtime Lifecycle Tests
//!
//! open -> ingest -> shutdown -> reopen, config files, monitoring.

use crate::common::*;
use patternstore::{HealthStatus, CONFIG_FILE_NAME};

#[test]
fn shutdown_snapshot_survives_reopen() {
    let dir = temp_dir();
    let vectors = random_vectors(60, 8, 99);

    {
        let runtime = PatternStoreRuntime::open(runtime_config(dir.path(), 8), EventBus::new()).unwrap();
        assert_eq!(runtime.restore_outcome(), &RestoreOutcome::NoSnapshot);
        for v in &vectors {
            runtime.gateway().on_pattern_event(record_with(v.clone(), 0.7));
        }
        assert!(matches!(runtime.shutdown().unwrap(), SnapshotOutcome::Written(_)));
        assert_eq!(runtime.stats().node_count, 60);
    }

    let reopened = PatternStoreRuntime::open(runtime_config(dir.path(), 8), EventBus::new()).unwrap();
    assert!(matches!(
        reopened.restore_outcome(),
        RestoreOutcome::Restored { node_count: 60, .. }
    ));
    let hits = reopened.search(&vectors[3], 1).unwrap();
    assert!(hits[0].score < 1e-5);
    reopened.shutdown().unwrap();
}

#[test]
fn incompatible_dimension_on_reopen_starts_empty() {
    let dir = temp_dir();
    {
        let runtime = PatternStoreRuntime::open(runtime_config(dir.path(), 8), EventBus::new()).unwrap();
        runtime.insert(vec![0.2; 8], meta(0.5)).unwrap();
        runtime.shutdown().unwrap();
    }

    let runtime = PatternStoreRuntime::open(runtime_config(dir.path(), 12), EventBus::new()).unwrap();
    assert!(matches!(runtime.restore_outcome(), RestoreOutcome::Discarded { .. }));
    assert_eq!(runtime.stats().node_count, 0);
}

#[test]
fn open_dir_writes_default_config() {
    let dir = temp_dir();
    let runtime = PatternStoreRuntime::open_dir(dir.path(), EventBus::new()).unwrap();
    assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    assert_eq!(runtime.config().index.dimension, 100);
    assert!(runtime.config().persistence.snapshot_path.starts_with(dir.path()));
    runtime.shutdown().unwrap();
}

#[test]
fn invalid_config_is_rejected() {
    let dir = temp_dir();
    let mut config = runtime_config(dir.path(), 8);
    config.ingest.queue_low_water = config.ingest.queue_high_water;
    assert!(PatternStoreRuntime::open(config, EventBus::new()).is_err());
}

#[test]
fn report_reflects_ingest_and_persistence() {
    let dir = temp_dir();
    let runtime = PatternStoreRuntime::open(runtime_config(dir.path(), 8), EventBus::new()).unwrap();
    for v in random_vectors(20, 8, 4) {
        runtime.gateway().on_pattern_event(record_with(v, 0.5));
    }
    runtime.gateway().flush();
    runtime.persistence().snapshot().unwrap();

    let report = runtime.report();
    assert_eq!(report.index.node_count, 20);
    assert_eq!(report.ingest.received, 20);
    assert_eq!(report.ingest.indexed, 20);
    assert_eq!(report.persistence.as_ref().unwrap().snapshots_written, 1);
    assert_eq!(report.health, HealthStatus::Healthy);
    runtime.shutdown().unwrap();
}

#[test]
fn shutdown_is_idempotent() {
    let dir = temp_dir();
    let runtime = PatternStoreRuntime::open(runtime_config(dir.path(), 8), EventBus::new()).unwrap();
    assert!(matches!(runtime.shutdown().unwrap(), SnapshotOutcome::Written(_)));
    assert!(matches!(runtime.shutdown().unwrap(), SnapshotOutcome::Disabled));
}
