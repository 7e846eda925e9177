//! Core value types shared by the index, persistence and ingestion layers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PatternError;

/// Identifier of a node in the pattern index
///
/// Ids are assigned from a monotonic counter, so id order equals
/// insertion order. Search results use this for deterministic tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Wrap a raw id
    pub const fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Raw id value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance metric used by the index
///
/// All metrics are normalized to "lower = closer"; an identical vector is at
/// distance 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance: 1 - dot(a,b) / (||a|| * ||b||)
    /// Range: [0, 2]
    #[default]
    Cosine,

    /// Euclidean (L2) distance
    /// Range: [0, inf)
    Euclidean,
}

impl DistanceMetric {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Some(DistanceMetric::Cosine),
            "euclidean" | "l2" => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }

    /// Serialization value for snapshot headers
    pub fn to_byte(&self) -> u8 {
        match self {
            DistanceMetric::Cosine => 0,
            DistanceMetric::Euclidean => 1,
        }
    }

    /// Deserialization from snapshot headers
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(DistanceMetric::Cosine),
            1 => Some(DistanceMetric::Euclidean),
            _ => None,
        }
    }
}

/// Metadata attached to every indexed pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// Producer confidence in [0, 1]; drives eviction and backpressure shedding
    pub confidence: f32,
    /// Producer tag (e.g. the subsystem that emitted the pattern)
    pub source: String,
    /// Pattern context type, part of the dedup fingerprint
    pub context_type: String,
    /// Upstream pattern identifier, if the producer supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Insertion time (microseconds since epoch)
    pub inserted_at: u64,
    /// Dedup fingerprint, if the record came through the ingestion gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<u64>,
}

impl PatternMetadata {
    /// Metadata stamped with the current time and no fingerprint
    pub fn new(confidence: f32, source: impl Into<String>, context_type: impl Into<String>) -> Self {
        PatternMetadata {
            confidence,
            source: source.into(),
            context_type: context_type.into(),
            pattern_id: None,
            inserted_at: now_micros(),
            fingerprint: None,
        }
    }

    /// Set the upstream pattern id
    pub fn with_pattern_id(mut self, pattern_id: impl Into<String>) -> Self {
        self.pattern_id = Some(pattern_id.into());
        self
    }

    /// Set the dedup fingerprint
    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Override the insertion timestamp
    pub fn with_inserted_at(mut self, inserted_at: u64) -> Self {
        self.inserted_at = inserted_at;
        self
    }
}

/// One search result as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Matching node
    pub id: NodeId,
    /// Distance to the query (lower = closer)
    pub score: f32,
    /// Upstream pattern id of the match, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
}

/// Insert reply for outer layers: `{status: "ok", id}` or
/// `{status: "error", reason}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InsertReply {
    /// Insert succeeded
    Ok {
        /// Assigned node id
        id: NodeId,
    },
    /// Insert was rejected
    Error {
        /// Human-readable rejection reason
        reason: String,
    },
}

impl From<Result<NodeId, PatternError>> for InsertReply {
    fn from(result: Result<NodeId, PatternError>) -> Self {
        match result {
            Ok(id) => InsertReply::Ok { id },
            Err(e) => InsertReply::Error {
                reason: e.to_string(),
            },
        }
    }
}

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_orders_by_insertion() {
        assert!(NodeId::new(1) < NodeId::new(2));
        assert_eq!(NodeId::new(7).to_string(), "7");
    }

    #[test]
    fn test_metric_byte_roundtrip() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
            assert_eq!(DistanceMetric::from_byte(metric.to_byte()), Some(metric));
        }
        assert_eq!(DistanceMetric::from_byte(9), None);
        assert_eq!(DistanceMetric::parse("L2"), Some(DistanceMetric::Euclidean));
    }

    #[test]
    fn test_insert_reply_json_shape() {
        let ok = InsertReply::from(Ok(NodeId::new(3)));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["id"], 3);

        let err = InsertReply::from(Err(PatternError::DimensionMismatch {
            expected: 4,
            got: 2,
        }));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["reason"].as_str().unwrap().contains("Dimension mismatch"));
    }

    #[test]
    fn test_metadata_builders() {
        let meta = PatternMetadata::new(0.5, "s4", "test_pattern")
            .with_pattern_id("p-1")
            .with_fingerprint(99)
            .with_inserted_at(10);
        assert_eq!(meta.pattern_id.as_deref(), Some("p-1"));
        assert_eq!(meta.fingerprint, Some(99));
        assert_eq!(meta.inserted_at, 10);
    }
}
