//! Distance functions for the pattern index.
//!
//! All values are normalized to "lower = closer"; identical vectors are at
//! distance 0. Functions are single-threaded and never normalize their
//! inputs.

use patternstore_core::DistanceMetric;

/// Compute the distance between two vectors
pub fn compute_distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in distance computation");

    match metric {
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::Euclidean => euclidean_distance(a, b),
    }
}

/// Cosine distance: 1 - dot(a,b) / (||a|| * ||b||)
///
/// Returns 1.0 if either vector has zero norm (orthogonal to everything).
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        // Clamp rounding noise so identical vectors land on exactly 0
        (1.0 - dot / (norm_a * norm_b)).max(0.0)
    }
}

/// Euclidean distance: sqrt(sum((a[i] - b[i])^2))
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm of a vector
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
