//! On-disk byte formats for snapshots.
//!
//! Keeping serialization separate from operational logic (how snapshots are
//! scheduled and restored) makes format evolution easier to manage.
//!
//! # Module Structure
//!
//! - `snapshot`: Snapshot header and container layout
//! - `image`: Serializable graph image carried in the snapshot body

pub mod image;
pub mod snapshot;

pub use image::{GraphImage, NodeImage};
pub use snapshot::{
    SnapshotHeader, SnapshotHeaderError, SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE,
    SNAPSHOT_MAGIC,
};
