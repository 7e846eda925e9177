//! Hierarchical proximity graph index
//!
//! - `distance`: metric kernels ("lower = closer")
//! - `hnsw`: graph structure, insert and search
//! - `evict`: node removal with edge and entry-point repair

pub mod distance;
mod evict;
pub mod hnsw;

pub use distance::{compute_distance, l2_norm};
pub use evict::RemovalReport;
pub use hnsw::{HnswGraph, NodeRef};
