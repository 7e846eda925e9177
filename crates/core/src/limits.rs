//! Hard limits enforced regardless of configuration
//!
//! Configuration validation rejects values outside these bounds, and the
//! query surface clamps request sizes to them.

/// Maximum vector dimensionality accepted by the index
pub const MAX_VECTOR_DIM: usize = 8192;

/// Maximum `k` a single search may request
pub const MAX_SEARCH_K: usize = 10_000;

/// Maximum per-layer degree cap (`M`)
pub const MAX_DEGREE: usize = 512;

/// Maximum number of records the ingestion queue may hold
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Clamp a requested result count to `MAX_SEARCH_K`
pub fn clamp_k(k: usize) -> usize {
    k.min(MAX_SEARCH_K)
}
