//! Core types for the pattern store
//!
//! This crate defines the foundational types used throughout the system:
//! - NodeId: Identifier of an indexed pattern
//! - PatternMetadata: Confidence, source and provenance of a pattern
//! - DistanceMetric: Cosine / Euclidean distance selection
//! - SearchHit, InsertReply: Query surface result types
//! - StoreConfig: `patternstore.toml` configuration
//! - PatternError: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod limits;
pub mod types;

pub use config::{
    CapacityConfig, IndexParams, IngestConfig, PersistenceConfig, StoreConfig, CONFIG_FILE_NAME,
    FINGERPRINT_VERSION,
};
pub use error::{PatternError, PatternResult};
pub use types::{now_micros, DistanceMetric, InsertReply, NodeId, PatternMetadata, SearchHit};
