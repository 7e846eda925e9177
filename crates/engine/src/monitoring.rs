//! Health reporting across the index, gateway and persistence

use serde::{Deserialize, Serialize};

use crate::persistence::PersistenceStatus;
use crate::store::IndexStats;

/// Gateway counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestMetrics {
    /// Records submitted
    pub received: u64,
    /// Records that became nodes
    pub indexed: u64,
    /// Records dropped as duplicates (window or index)
    pub deduplicated: u64,
    /// Records shed by backpressure
    pub dropped: u64,
    /// Records rejected at submit or failed at insert
    pub index_errors: u64,
    /// Batches drained
    pub batches: u64,
    /// Current queue depth
    pub queue_depth: usize,
    /// Whether backpressure mode is active
    pub backpressure_active: bool,
}

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Everything nominal
    Healthy,
    /// Shedding load or the last snapshot failed
    Degraded,
    /// Snapshots keep failing
    Critical,
}

impl HealthStatus {
    /// Derive health from gateway and persistence state
    pub fn derive(
        backpressure_active: bool,
        persistence: Option<&PersistenceStatus>,
        failure_alert_threshold: u32,
    ) -> Self {
        if let Some(p) = persistence {
            if failure_alert_threshold > 0 && p.consecutive_failures >= failure_alert_threshold {
                return HealthStatus::Critical;
            }
            if p.consecutive_failures > 0 {
                return HealthStatus::Degraded;
            }
        }
        if backpressure_active {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Combined view for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    /// Index statistics
    pub index: IndexStats,
    /// Gateway counters
    pub ingest: IngestMetrics,
    /// Snapshot counters, `None` when persistence is disabled
    pub persistence: Option<PersistenceStatus>,
    /// Derived health
    pub health: HealthStatus,
}
