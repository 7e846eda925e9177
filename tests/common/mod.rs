//! Shared test utilities for the integration suite.
//!
//! Import via `mod common;` from a test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::Path;
use std::sync::Arc;

pub use patternstore::{
    CapacityConfig, DistanceMetric, EventBus, IndexParams, IngestConfig, IngestionGateway,
    NodeId, Notification, PatternMetadata, PatternRecord, PatternStore, PatternStoreRuntime,
    PersistenceConfig, PersistenceManager, RestoreOutcome, SnapshotOutcome, StoreConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// ============================================================================
// Data
// ============================================================================

/// Deterministic vectors in [-1, 1)
pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// Metadata with a fixed confidence
pub fn meta(confidence: f32) -> PatternMetadata {
    PatternMetadata::new(confidence, "test", "integration")
}

/// Record carrying an explicit vector
pub fn record_with(vector: Vec<f32>, confidence: f32) -> PatternRecord {
    PatternRecord::new("integration", "test", confidence).with_vector(vector)
}

// ============================================================================
// Configs
// ============================================================================

/// Small, fast index parameters
pub fn small_params(dim: usize, metric: DistanceMetric) -> IndexParams {
    IndexParams {
        dimension: dim,
        metric,
        max_degree: 8,
        ef_construction: 64,
        ef_search: 64,
        seed: 42,
    }
}

/// Persistence pointed into `dir`, long interval so only explicit snapshots run
pub fn persistence_in(dir: &Path) -> PersistenceConfig {
    PersistenceConfig {
        enabled: true,
        snapshot_path: dir.join("patterns.snap"),
        snapshot_interval_secs: 3600,
        failure_alert_threshold: 3,
    }
}

/// Full config for a runtime rooted in `dir`
pub fn runtime_config(dir: &Path, dim: usize) -> StoreConfig {
    StoreConfig {
        index: small_params(dim, DistanceMetric::Cosine),
        persistence: persistence_in(dir),
        capacity: CapacityConfig::default(),
        ingest: IngestConfig {
            batch_size: 16,
            batch_timeout_ms: 10,
            stats_every_batches: 0,
            ..IngestConfig::default()
        },
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Store filled with `n` random vectors (ids 0..n)
pub fn filled_store(n: usize, dim: usize, seed: u64) -> (Arc<PatternStore>, Vec<Vec<f32>>) {
    let store = Arc::new(PatternStore::new(small_params(dim, DistanceMetric::Euclidean)).unwrap());
    let vectors = random_vectors(n, dim, seed);
    for v in &vectors {
        store.insert(v.clone(), meta(0.5)).unwrap();
    }
    (store, vectors)
}

/// Brute-force top-k by euclidean distance, ties by index
pub fn brute_force_top_k(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<NodeId> {
    let mut scored: Vec<(f32, usize)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let d = v
                .iter()
                .zip(query)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            (d, i)
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(k)
        .map(|(_, i)| NodeId::new(i as u64))
        .collect()
}

/// Temp directory for one test
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("temp dir")
}
