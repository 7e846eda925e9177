//! Index Tests
//!
//! Insert/search round trips, structural invariants under arbitrary insert
//! sequences, and search quality against brute force.

use crate::common::*;
use patternstore::PatternError;
use proptest::prelude::*;

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn inserted_vector_is_its_own_nearest_neighbor() {
    for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
        let store = PatternStore::new(small_params(16, metric)).unwrap();
        let vectors = random_vectors(200, 16, 5);
        for v in &vectors {
            store.insert(v.clone(), meta(0.5)).unwrap();
        }
        let probe = store.insert(vec![0.25; 16], meta(0.5)).unwrap();

        let hits = store.search(&[0.25; 16], 1).unwrap();
        assert_eq!(hits[0].id, probe, "{:?}", metric);
        assert!(hits[0].score < 1e-5);
    }
}

#[test]
fn empty_index_and_zero_k_return_nothing() {
    let store = PatternStore::new(small_params(4, DistanceMetric::Cosine)).unwrap();
    assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 10).unwrap().is_empty());

    store.insert(vec![1.0, 0.0, 0.0, 0.0], meta(0.5)).unwrap();
    assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 0).unwrap().is_empty());
}

#[test]
fn k_larger_than_index_returns_everything_sorted() {
    let (store, _) = filled_store(12, 8, 3);
    let hits = store.search(&[0.0; 8], 100).unwrap();
    assert_eq!(hits.len(), 12);
    for pair in hits.windows(2) {
        assert!(pair[0].score <= pair[1].score);
    }
}

#[test]
fn invalid_inputs_are_rejected_without_side_effects() {
    let (store, _) = filled_store(20, 8, 4);
    let before = store.image();

    assert!(store.insert(vec![1.0; 7], meta(0.5)).is_err());
    assert!(store.insert(vec![f32::INFINITY; 8], meta(0.5)).is_err());
    assert!(store.search(&[0.0; 9], 3).is_err());

    assert_eq!(store.image(), before);
    assert_eq!(store.search(&[0.0; 8], 3).unwrap().len(), 3);
}

#[test]
fn duplicate_fingerprint_through_plain_insert_is_refused() {
    let (store, _) = filled_store(20, 8, 6);
    let tagged = store.insert(vec![0.4; 8], meta(0.5).with_fingerprint(0xF00D)).unwrap();
    let before = store.image();

    let err = store
        .insert(vec![-0.4; 8], meta(0.9).with_fingerprint(0xF00D))
        .unwrap_err();
    assert!(matches!(err, PatternError::InvalidState(_)));
    assert_eq!(store.image(), before);
    assert_eq!(store.lookup_fingerprint(0xF00D), Some(tagged));
    store.verify_integrity().unwrap();
}

#[test]
fn degenerate_index_params_are_rejected_up_front() {
    let params = IndexParams {
        max_degree: 1,
        ..small_params(8, DistanceMetric::Euclidean)
    };
    assert!(matches!(
        PatternStore::new(params),
        Err(PatternError::InvalidConfig(_))
    ));
}

// ============================================================================
// Quality
// ============================================================================

#[test]
fn recall_at_10_on_1000_random_64d_vectors() {
    let dim = 64;
    let store = PatternStore::new(IndexParams {
        dimension: dim,
        metric: DistanceMetric::Euclidean,
        max_degree: 16,
        ef_construction: 200,
        ef_search: 200,
        seed: 42,
    })
    .unwrap();
    let vectors = random_vectors(1000, dim, 2024);
    for v in &vectors {
        store.insert(v.clone(), meta(0.5)).unwrap();
    }

    // Every stored vector finds itself at ~0 distance
    for (i, v) in vectors.iter().enumerate().step_by(10) {
        let hits = store.search(v, 10).unwrap();
        assert!(
            hits.iter()
                .any(|h| h.id == NodeId::new(i as u64) && h.score < 1e-4),
            "vector {} missing from its own top-10",
            i
        );
    }

    let queries = random_vectors(50, dim, 77);
    let mut total = 0.0;
    for q in &queries {
        let truth = brute_force_top_k(&vectors, q, 10);
        let found: Vec<NodeId> = store.search(q, 10).unwrap().into_iter().map(|h| h.id).collect();
        total += truth.iter().filter(|id| found.contains(id)).count() as f64 / 10.0;
    }
    let recall = total / queries.len() as f64;
    assert!(recall >= 0.9, "recall@10 = {:.3}", recall);
}

#[test]
fn identical_insert_sequences_build_identical_graphs() {
    let vectors = random_vectors(300, 12, 8);
    let build = || {
        let store = PatternStore::new(small_params(12, DistanceMetric::Cosine)).unwrap();
        for v in &vectors {
            store
                .insert(v.clone(), meta(0.5).with_inserted_at(1))
                .unwrap();
        }
        store.image()
    };
    assert_eq!(build(), build());
}

// ============================================================================
// Structural Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn degree_bound_and_hierarchy_hold_for_any_sequence(
        vectors in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, 6), 1..150),
        max_degree in 2usize..8,
        cosine in any::<bool>(),
    ) {
        let metric = if cosine { DistanceMetric::Cosine } else { DistanceMetric::Euclidean };
        let params = IndexParams {
            dimension: 6,
            metric,
            max_degree,
            ef_construction: 24,
            ef_search: 24,
            seed: 11,
        };
        let store = PatternStore::new(params.clone()).unwrap();
        for v in vectors {
            store.insert(v, meta(0.5)).unwrap();
        }

        let image = store.image();
        for node in &image.nodes {
            for (layer, list) in node.neighbors.iter().enumerate() {
                prop_assert!(list.len() <= params.degree_cap(layer));
                for neighbor in list {
                    let target = image.nodes.iter().find(|n| n.id == *neighbor);
                    prop_assert!(target.is_some(), "dangling {}", neighbor);
                    // Hierarchical inclusion: a neighbor on layer L owns layers 0..=L
                    prop_assert!(target.unwrap().neighbors.len() > layer);
                }
            }
        }
        prop_assert!(store.verify_integrity().is_ok());
    }
}
