//! Ingestion Tests
//!
//! Dedup idempotence, burst backpressure and bus-driven intake through the
//! gateway into the index.

use crate::common::*;
use patternstore::{SubmitOutcome, TOPIC_PATTERN_INDEXED};
use std::sync::Arc;
use std::time::Duration;

fn gateway(dim: usize, ingest: IngestConfig) -> (Arc<PatternStore>, IngestionGateway, EventBus) {
    let store = Arc::new(PatternStore::new(small_params(dim, DistanceMetric::Cosine)).unwrap());
    let bus = EventBus::new();
    let gw = IngestionGateway::new(Arc::clone(&store), None, bus.clone(), ingest);
    (store, gw, bus)
}

#[test]
fn k_identical_submissions_yield_one_node() {
    let (store, gw, _) = gateway(8, IngestConfig::default());
    let k = 25;
    for _ in 0..k {
        gw.on_pattern_event(record_with(vec![0.3; 8], 0.6));
    }
    gw.flush();

    assert_eq!(store.len(), 1);
    let m = gw.metrics();
    assert_eq!(m.indexed, 1);
    assert_eq!(m.deduplicated, k - 1);
}

#[test]
fn near_identical_vectors_share_a_fingerprint() {
    let (store, gw, _) = gateway(4, IngestConfig::default());
    gw.on_pattern_event(record_with(vec![0.500, 0.2, 0.1, 0.0], 0.6));
    let second = gw.on_pattern_event(record_with(vec![0.501, 0.2, 0.1, 0.0], 0.6));
    assert!(matches!(second, SubmitOutcome::Duplicate));
    gw.flush();
    assert_eq!(store.len(), 1);
}

#[test]
fn burst_over_high_water_drops_at_least_the_excess() {
    let high = 200;
    let ingest = IngestConfig {
        queue_high_water: high,
        queue_low_water: 100,
        batch_size: 32,
        ..IngestConfig::default()
    };
    let (store, gw, _) = gateway(8, ingest);

    let vectors = random_vectors(high + 100, 8, 13);
    for (i, v) in vectors.into_iter().enumerate() {
        gw.on_pattern_event(record_with(v, (i % 10) as f32 / 10.0));
        assert!(gw.metrics().queue_depth <= high);
    }

    let m = gw.metrics();
    assert!(m.dropped >= 100, "dropped {}", m.dropped);
    assert!(m.queue_depth <= high);

    gw.flush();
    assert_eq!(store.len() as u64, gw.metrics().indexed);
    // Backpressure sheds the weakest records first
    let low_conf = store
        .image()
        .nodes
        .iter()
        .filter(|n| n.metadata.confidence < 0.1)
        .count();
    assert!(low_conf < 20);
}

#[test]
fn bus_records_flow_into_the_index() {
    let (store, gw, bus) = gateway(8, IngestConfig {
        batch_size: 4,
        batch_timeout_ms: 5,
        ..IngestConfig::default()
    });
    let gw = Arc::new(gw);
    let summaries = bus.subscribe(TOPIC_PATTERN_INDEXED);
    gw.start_drainer().unwrap();
    gw.start_pump().unwrap();

    let vectors = random_vectors(10, 8, 21);
    for v in &vectors[..4] {
        bus.publish(Notification::PatternMatched(record_with(v.clone(), 0.8)));
    }
    bus.publish(Notification::PatternsExtracted {
        patterns: vectors[4..]
            .iter()
            .map(|v| record_with(v.clone(), 0.8))
            .collect(),
        source: "extractor".to_string(),
    });

    gw.shutdown();
    assert_eq!(store.len(), 10);

    let mut indexed_by_source = std::collections::BTreeMap::new();
    while let Some(n) = summaries.recv_timeout(Duration::from_millis(10)) {
        if let Notification::PatternIndexed(s) = n {
            *indexed_by_source.entry(s.source).or_insert(0) += s.count;
        }
    }
    assert_eq!(indexed_by_source.get("test"), Some(&4));
    assert_eq!(indexed_by_source.get("extractor"), Some(&6));
}
