//! Pattern records as published by upstream producers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute key carrying the signal intensity of a pattern
pub const INTENSITY_ATTRIBUTE: &str = "intensity";

/// One pattern observation
///
/// `vector` is optional: producers that only report structured attributes
/// are embedded by the `PatternVectorizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Upstream pattern identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Context type (e.g. "temporal", "anomaly")
    pub context_type: String,
    /// Emitting subsystem
    pub source: String,
    /// Producer confidence in [0, 1]
    pub confidence: f32,
    /// Explicit embedding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Free-form attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl PatternRecord {
    /// Record without vector or attributes
    pub fn new(context_type: impl Into<String>, source: impl Into<String>, confidence: f32) -> Self {
        PatternRecord {
            pattern_id: None,
            context_type: context_type.into(),
            source: source.into(),
            confidence,
            vector: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an explicit embedding
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Set the upstream pattern id
    pub fn with_pattern_id(mut self, pattern_id: impl Into<String>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Confidence clamped to [0, 1]; NaN counts as 0
    pub fn effective_confidence(&self) -> f32 {
        if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        }
    }

    /// Numeric `intensity` attribute, if present
    pub fn intensity(&self) -> Option<f32> {
        self.attributes
            .get(INTENSITY_ATTRIBUTE)
            .and_then(Value::as_f64)
            .map(|v| v as f32)
    }
}
