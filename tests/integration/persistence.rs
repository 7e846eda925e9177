//! Persistence Tests
//!
//! Snapshot/restore fidelity, corrupted and incompatible snapshots, and
//! variety-pressure pruning.

use crate::common::*;
use patternstore::{SnapshotReader, SNAPSHOT_FORMAT_VERSION};
use std::sync::Arc;

fn manager(store: &Arc<PatternStore>, config: PersistenceConfig, max_capacity: usize) -> PersistenceManager {
    PersistenceManager::new(
        Arc::clone(store),
        config,
        CapacityConfig {
            max_capacity,
            ..CapacityConfig::default()
        },
        None,
    )
}

fn snapshot_of(store: &Arc<PatternStore>, dir: &tempfile::TempDir) -> PersistenceConfig {
    let config = persistence_in(dir.path());
    let pm = manager(store, config.clone(), 1_000_000);
    assert!(matches!(pm.snapshot().unwrap(), SnapshotOutcome::Written(_)));
    config
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn restore_reproduces_the_persisted_graph() {
    let dir = temp_dir();
    let (store, vectors) = filled_store(400, 16, 31);
    let config = snapshot_of(&store, &dir);

    let fresh = Arc::new(PatternStore::new(store.params()).unwrap());
    let outcome = manager(&fresh, config, 1_000_000).restore().unwrap();

    let stats = store.stats();
    assert_eq!(
        outcome,
        RestoreOutcome::Restored {
            node_count: 400,
            entry_point: stats.entry_point,
        }
    );
    assert_eq!(fresh.stats().node_count, stats.node_count);
    assert_eq!(fresh.stats().max_level, stats.max_level);

    let original = store.image();
    let restored = fresh.image();
    for (a, b) in original.nodes.iter().zip(&restored.nodes) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.neighbors, b.neighbors);
        assert_eq!(a.metadata, b.metadata);
    }

    // Same answers before and after
    for q in vectors.iter().take(20) {
        assert_eq!(store.search(q, 5).unwrap(), fresh.search(q, 5).unwrap());
    }
}

#[test]
fn restored_store_keeps_assigning_fresh_ids() {
    let dir = temp_dir();
    let (store, _) = filled_store(30, 8, 2);
    let config = snapshot_of(&store, &dir);

    let fresh = Arc::new(PatternStore::new(store.params()).unwrap());
    manager(&fresh, config, 1_000_000).restore().unwrap();
    let id = fresh.insert(vec![0.1; 8], meta(0.5)).unwrap();
    assert_eq!(id, NodeId::new(30));
}

#[test]
fn snapshot_header_carries_format_version_and_params() {
    let dir = temp_dir();
    let (store, _) = filled_store(10, 8, 1);
    let config = snapshot_of(&store, &dir);

    let loaded = SnapshotReader::load(&config.snapshot_path).unwrap();
    assert_eq!(loaded.header.format_version, SNAPSHOT_FORMAT_VERSION);
    assert_eq!(loaded.header.dimension, 8);
    assert_eq!(loaded.header.node_count, 10);
}

// ============================================================================
// Corruption
// ============================================================================

#[test]
fn corrupted_snapshot_falls_back_to_empty_graph() {
    let dir = temp_dir();
    let (store, _) = filled_store(50, 8, 7);
    let config = snapshot_of(&store, &dir);

    let mut bytes = std::fs::read(&config.snapshot_path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x5A;
    std::fs::write(&config.snapshot_path, &bytes).unwrap();

    let fresh = Arc::new(PatternStore::new(store.params()).unwrap());
    let outcome = manager(&fresh, config, 1_000_000).restore().unwrap();
    assert!(matches!(outcome, RestoreOutcome::Discarded { .. }));
    assert!(fresh.is_empty());

    // The empty index is fully usable
    fresh.insert(vec![0.5; 8], meta(0.5)).unwrap();
    assert_eq!(fresh.search(&[0.5; 8], 1).unwrap().len(), 1);
}

#[test]
fn truncated_snapshot_falls_back_to_empty_graph() {
    let dir = temp_dir();
    let (store, _) = filled_store(50, 8, 7);
    let config = snapshot_of(&store, &dir);

    let bytes = std::fs::read(&config.snapshot_path).unwrap();
    std::fs::write(&config.snapshot_path, &bytes[..bytes.len() / 3]).unwrap();

    let fresh = Arc::new(PatternStore::new(store.params()).unwrap());
    let outcome = manager(&fresh, config, 1_000_000).restore().unwrap();
    assert!(matches!(outcome, RestoreOutcome::Discarded { .. }));
    assert!(fresh.is_empty());
}

#[test]
fn future_format_version_is_rejected() {
    let dir = temp_dir();
    let (store, _) = filled_store(5, 8, 7);
    let config = snapshot_of(&store, &dir);

    let mut bytes = std::fs::read(&config.snapshot_path).unwrap();
    bytes[4..8].copy_from_slice(&(SNAPSHOT_FORMAT_VERSION + 1).to_le_bytes());
    std::fs::write(&config.snapshot_path, &bytes).unwrap();

    let fresh = Arc::new(PatternStore::new(store.params()).unwrap());
    let outcome = manager(&fresh, config, 1_000_000).restore().unwrap();
    assert!(matches!(outcome, RestoreOutcome::Discarded { .. }));
}

#[test]
fn metric_mismatch_is_rejected() {
    let dir = temp_dir();
    let (store, _) = filled_store(5, 8, 7);
    let config = snapshot_of(&store, &dir);

    let other = Arc::new(PatternStore::new(small_params(8, DistanceMetric::Cosine)).unwrap());
    let outcome = manager(&other, config, 1_000_000).restore().unwrap();
    assert!(matches!(outcome, RestoreOutcome::Discarded { .. }));
    assert!(other.is_empty());
}

// ============================================================================
// Pruning
// ============================================================================

#[test]
fn pruning_brings_occupancy_to_target() {
    let max_capacity = 500;
    let store = Arc::new(PatternStore::new(small_params(8, DistanceMetric::Euclidean)).unwrap());
    for (i, v) in random_vectors(450, 8, 17).into_iter().enumerate() {
        let confidence = 0.05 + (i % 19) as f32 / 20.0;
        store.insert(v, meta(confidence)).unwrap();
    }
    let pm = manager(&store, persistence_in(temp_dir().path()), max_capacity);
    assert!(pm.variety_pressure() >= 0.8);

    let report = pm.prune_if_needed().expect("pressure should trigger pruning");
    assert!(report.evicted > 0);
    assert!(store.len() as f64 / max_capacity as f64 <= 0.7);

    // No dangling ids, degree bound and entry point intact
    store.verify_integrity().unwrap();
    let image = store.image();
    let live: std::collections::HashSet<NodeId> = image.nodes.iter().map(|n| n.id).collect();
    for node in &image.nodes {
        for list in &node.neighbors {
            assert!(list.iter().all(|id| live.contains(id)));
        }
        assert!(node.metadata.confidence >= 0.1);
    }
    assert!(live.contains(&image.entry_point.unwrap()));
}

#[test]
fn pruned_index_still_answers_queries() {
    let max_capacity = 300;
    let store = Arc::new(PatternStore::new(small_params(8, DistanceMetric::Euclidean)).unwrap());
    let vectors = random_vectors(290, 8, 23);
    for v in &vectors {
        store.insert(v.clone(), meta(0.5)).unwrap();
    }
    let pm = manager(&store, persistence_in(temp_dir().path()), max_capacity);
    pm.prune_if_needed().unwrap();

    // Equal confidence: the oldest went first, the newest survive
    let survivors_found = vectors
        .iter()
        .enumerate()
        .skip(290 - 150)
        .filter(|(i, v)| {
            store
                .search(v, 1)
                .unwrap()
                .first()
                .map(|h| h.id == NodeId::new(*i as u64))
                .unwrap_or(false)
        })
        .count();
    assert!(survivors_found >= 140, "found {}", survivors_found);
}
