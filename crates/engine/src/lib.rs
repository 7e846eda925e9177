//! Pattern store engine
//!
//! This crate orchestrates the lower layers:
//! - Index: HNSW graph with insert, search and eviction repair
//! - PatternStore: lock-guarded single owner of the graph
//! - Persistence: snapshots, one-shot restore, variety-pressure pruning
//! - Ingest: dedup, backpressure and batching of pattern records
//! - Bus: in-process topic pub/sub for ingress and egress notifications
//! - Runtime: open/shutdown lifecycle wiring all of the above

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod events;
pub mod index;
pub mod ingest;
pub mod monitoring;
pub mod persistence;
pub mod runtime;
pub mod store;

pub use bus::{EventBus, Subscription};
pub use events::{
    AlgedonicSignal, IndexSummary, Notification, SnapshotAlert, StatsUpdate, TOPIC_ALGEDONIC,
    TOPIC_PATTERNS_EXTRACTED, TOPIC_PATTERN_INDEXED, TOPIC_PATTERN_MATCHED,
    TOPIC_PERSISTENCE_ALERT, TOPIC_STATS_UPDATE,
};
pub use index::{HnswGraph, RemovalReport};
pub use ingest::{BatchReport, IngestionGateway, PatternRecord, SubmitOutcome};
pub use monitoring::{HealthStatus, IngestMetrics, MonitoringReport};
pub use persistence::{
    PersistenceManager, PersistenceStatus, PruneReport, RestoreOutcome, SnapshotOutcome,
};
pub use runtime::PatternStoreRuntime;
pub use store::{IndexStats, InsertOutcome, PatternStore};
