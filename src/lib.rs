//! Patternstore - streaming approximate-nearest-neighbor pattern store
//!
//! Pattern records arrive from upstream producers, are deduplicated,
//! rate-shaped and batched, then indexed in an HNSW graph for similarity
//! search. The graph is snapshotted crash-safely and restored at startup,
//! and pruned when it nears capacity.
//!
//! # Quick Start
//!
//! ```ignore
//! use patternstore::{EventBus, PatternRecord, PatternStoreRuntime, StoreConfig};
//!
//! let runtime = PatternStoreRuntime::open(StoreConfig::default(), EventBus::new())?;
//!
//! runtime.gateway().on_pattern_event(
//!     PatternRecord::new("temporal", "miner", 0.9).with_vector(vec![0.1; 100]),
//! );
//! runtime.gateway().flush();
//!
//! let hits = runtime.search(&[0.1; 100], 5)?;
//! runtime.shutdown()?;
//! ```
//!
//! # Architecture
//!
//! - `patternstore-core`: ids, metadata, errors, configuration
//! - `patternstore-durability`: snapshot format, writer and reader
//! - `patternstore-engine`: index, store, persistence, ingestion, bus

pub use patternstore_core::*;
pub use patternstore_durability::{
    GraphImage, LoadedSnapshot, NodeImage, SnapshotInfo, SnapshotReadError, SnapshotReader,
    SnapshotWriter, SNAPSHOT_FORMAT_VERSION,
};
pub use patternstore_engine::*;
