//! Deterministic embeddings for records that arrive without a vector
//!
//! Signed feature hashing: every feature string hashes (xxh3) to a slot and
//! a sign, contributions accumulate, and the result is L2-normalized. Equal
//! records always embed identically; records sharing features land close.

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::index::l2_norm;
use crate::ingest::record::PatternRecord;

/// Seed for feature hashing
const FEATURE_SEED: u64 = 0x5eed_0f_fea7;

/// Feature-hashing vectorizer for a fixed dimension
#[derive(Debug, Clone, Copy)]
pub struct PatternVectorizer {
    dimension: usize,
}

impl PatternVectorizer {
    /// Vectorizer producing `dimension`-length embeddings
    pub fn new(dimension: usize) -> Self {
        PatternVectorizer {
            dimension: dimension.max(1),
        }
    }

    /// Output dimensionality
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a record
    ///
    /// Features: context type, source, pattern id, and each attribute.
    /// Numeric attributes contribute their value (as `name`), booleans 0/1,
    /// strings contribute `name=value` with weight 1. Nested values are
    /// flattened with dotted names.
    pub fn vectorize(&self, record: &PatternRecord) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        self.add(&mut v, &format!("context:{}", record.context_type), 1.0);
        self.add(&mut v, &format!("source:{}", record.source), 1.0);
        if let Some(id) = &record.pattern_id {
            self.add(&mut v, &format!("pattern:{}", id), 1.0);
        }
        for (key, value) in &record.attributes {
            self.add_value(&mut v, key, value);
        }

        let norm = l2_norm(&v);
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn add_value(&self, v: &mut [f32], name: &str, value: &Value) {
        match value {
            Value::Null => {}
            Value::Bool(b) => self.add(v, name, if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => {
                if let Some(x) = n.as_f64().filter(|x| x.is_finite()) {
                    self.add(v, name, x as f32);
                }
            }
            Value::String(s) => self.add(v, &format!("{}={}", name, s), 1.0),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.add_value(v, &format!("{}.{}", name, i), item);
                }
            }
            Value::Object(map) => {
                for (k, item) in map {
                    self.add_value(v, &format!("{}.{}", name, k), item);
                }
            }
        }
    }

    fn add(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = xxh3_64_with_seed(feature.as_bytes(), FEATURE_SEED);
        let slot = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[slot] += sign * weight;
    }
}
