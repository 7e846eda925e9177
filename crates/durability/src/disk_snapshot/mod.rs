//! Crash-safe snapshot I/O
//!
//! - `writer`: temp-file + fsync + rename writer
//! - `reader`: validating loader

pub mod reader;
pub mod writer;

pub use reader::{LoadedSnapshot, SnapshotReadError, SnapshotReader};
pub use writer::{cleanup_temp_file, temp_path_for, SnapshotInfo, SnapshotWriteError, SnapshotWriter};
