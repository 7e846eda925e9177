//! Durability layer for the pattern store
//!
//! This crate handles everything that touches disk:
//!
//! - Binary snapshot format (header + MessagePack graph image + CRC32)
//! - Crash-safe snapshot creation (write-fsync-rename)
//! - Snapshot loading with structural validation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod disk_snapshot;
pub mod format;

pub use disk_snapshot::{
    cleanup_temp_file, temp_path_for, LoadedSnapshot, SnapshotInfo, SnapshotReadError,
    SnapshotReader, SnapshotWriteError, SnapshotWriter,
};
pub use format::{
    GraphImage, NodeImage, SnapshotHeader, SnapshotHeaderError, SNAPSHOT_FORMAT_VERSION,
    SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC,
};
