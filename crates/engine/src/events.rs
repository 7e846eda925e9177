//! Notifications exchanged with external collaborators
//!
//! Ingress topics carry pattern records into the gateway; egress topics
//! carry summaries, stats and alerts out.

use serde::{Deserialize, Serialize};

use crate::ingest::PatternRecord;
use crate::monitoring::HealthStatus;
use crate::store::IndexStats;

/// Single matched pattern (ingress)
pub const TOPIC_PATTERN_MATCHED: &str = "pattern_matched";
/// Bulk extraction with a shared source (ingress)
pub const TOPIC_PATTERNS_EXTRACTED: &str = "patterns_extracted";
/// Per-batch indexing summary (egress)
pub const TOPIC_PATTERN_INDEXED: &str = "pattern_indexed";
/// Periodic stats (egress)
pub const TOPIC_STATS_UPDATE: &str = "stats_update";
/// High-intensity patterns (egress)
pub const TOPIC_ALGEDONIC: &str = "algedonic_pattern";
/// Persistence alerts (egress)
pub const TOPIC_PERSISTENCE_ALERT: &str = "persistence_alert";

/// Summary emitted after each drained batch, one per source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Records indexed in this batch
    pub count: u64,
    /// Records dropped as duplicates since the previous summary
    pub deduplicated: u64,
    /// Producer tag
    pub source: String,
}

/// Periodic statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
    /// Index statistics
    pub index: IndexStats,
    /// Queue depth at publish time
    pub queue_depth: usize,
    /// Batches drained so far
    pub batches: u64,
    /// Derived health
    pub health: HealthStatus,
}

/// High-intensity pattern forwarded outside the batch path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgedonicSignal {
    /// The admitted record
    pub record: PatternRecord,
    /// Its intensity
    pub intensity: f32,
}

/// Raised after repeated snapshot failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAlert {
    /// Failures in a row
    pub consecutive_failures: u32,
    /// Last error message
    pub last_error: String,
}

/// Everything that travels over the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Ingress: one pattern
    PatternMatched(PatternRecord),
    /// Ingress: many patterns from one source
    PatternsExtracted {
        /// The records
        patterns: Vec<PatternRecord>,
        /// Source applied to every record
        source: String,
    },
    /// Egress: batch summary
    PatternIndexed(IndexSummary),
    /// Egress: periodic stats
    StatsUpdate(StatsUpdate),
    /// Egress: high-intensity pattern
    AlgedonicPattern(AlgedonicSignal),
    /// Egress: persistence alert
    SnapshotAlert(SnapshotAlert),
}

impl Notification {
    /// Topic this notification is published on
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::PatternMatched(_) => TOPIC_PATTERN_MATCHED,
            Notification::PatternsExtracted { .. } => TOPIC_PATTERNS_EXTRACTED,
            Notification::PatternIndexed(_) => TOPIC_PATTERN_INDEXED,
            Notification::StatsUpdate(_) => TOPIC_STATS_UPDATE,
            Notification::AlgedonicPattern(_) => TOPIC_ALGEDONIC,
            Notification::SnapshotAlert(_) => TOPIC_PERSISTENCE_ALERT,
        }
    }
}
