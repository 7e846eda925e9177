//! Crash-safe snapshot writer
//!
//! Uses write-fsync-rename pattern for atomic snapshot creation.
//!
//! # Crash Safety
//!
//! The snapshot creation follows this pattern:
//! 1. Write to temporary file (`.<name>.tmp` next to the target)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final path
//! 4. fsync the parent directory
//!
//! Either the previous complete snapshot or the new complete snapshot is
//! visible at the final path; never a partial one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use patternstore_core::{now_micros, IndexParams};
use tracing::debug;

use crate::format::{GraphImage, SnapshotHeader};

/// Snapshot writer with crash-safe semantics
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    /// Create a writer targeting `path`
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(SnapshotWriter { path })
    }

    /// Final snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary path used while writing
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.path)
    }

    /// Write a snapshot of `image` built with `params`
    ///
    /// Returns snapshot info on success. On failure the previous snapshot (if
    /// any) is left untouched; a leftover temp file is removed best-effort.
    pub fn write(
        &self,
        params: &IndexParams,
        image: &GraphImage,
    ) -> Result<SnapshotInfo, SnapshotWriteError> {
        let body = rmp_serde::to_vec(image)
            .map_err(|e| SnapshotWriteError::Encode(e.to_string()))?;

        let created_at = now_micros();
        let header = SnapshotHeader::new(
            params,
            image.nodes.len() as u64,
            image.entry_point.map(|id| id.as_u64()),
            created_at,
        );
        let header_bytes = header.to_bytes();
        let body_len = (body.len() as u64).to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&body_len);
        hasher.update(&body);
        let crc = hasher.finalize();

        let temp_path = self.temp_path();
        let parts: [&[u8]; 3] = [&header_bytes[..], &body_len[..], &body[..]];
        let result = self.write_and_rename(&temp_path, &parts, crc);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result?;

        let bytes_written = (header_bytes.len() + body_len.len() + body.len() + 4) as u64;
        debug!(
            target: "patternstore::persistence",
            path = %self.path.display(),
            nodes = image.nodes.len(),
            bytes = bytes_written,
            "Snapshot file written"
        );
        Ok(SnapshotInfo {
            path: self.path.clone(),
            node_count: image.nodes.len() as u64,
            entry_point: image.entry_point.map(|id| id.as_u64()),
            created_at,
            bytes_written,
            crc,
        })
    }

    fn write_and_rename(&self, temp_path: &Path, parts: &[&[u8]], crc: u32) -> io::Result<()> {
        // Step 1: Write to temporary file
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(temp_path)?;
        for part in parts {
            file.write_all(part)?;
        }
        file.write_all(&crc.to_le_bytes())?;

        // Step 2: fsync the file
        file.sync_all()?;
        drop(file);

        // Step 3: Atomic rename
        std::fs::rename(temp_path, &self.path)?;

        // Step 4: fsync parent directory
        sync_parent_dir(&self.path)
    }
}

/// Temp path for a snapshot target: `.<file_name>.tmp` in the same directory
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Remove a temp file left behind by an interrupted write.
///
/// Returns whether a file was removed.
pub fn cleanup_temp_file(path: &Path) -> io::Result<bool> {
    let temp = temp_path_for(path);
    match std::fs::remove_file(&temp) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Information about a created snapshot
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// Final snapshot path
    pub path: PathBuf,
    /// Number of nodes written
    pub node_count: u64,
    /// Entry point written
    pub entry_point: Option<u64>,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
    /// Total file size
    pub bytes_written: u64,
    /// Footer CRC32
    pub crc: u32,
}

/// Errors that can occur when writing a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotWriteError {
    /// Filesystem failure
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),
    /// Graph image could not be encoded
    #[error("Snapshot encode error: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{SNAPSHOT_FORMAT_VERSION, SNAPSHOT_HEADER_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_file_and_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("patterns.snap");
        let writer = SnapshotWriter::new(&path).unwrap();

        let info = writer
            .write(&IndexParams::with_dimension(4), &GraphImage::empty(42))
            .unwrap();

        assert!(path.exists());
        assert!(!writer.temp_path().exists());
        assert_eq!(info.node_count, 0);
        assert_eq!(info.entry_point, None);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            info.bytes_written
        );

        let bytes = std::fs::read(&path).unwrap();
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(version, SNAPSHOT_FORMAT_VERSION);
        assert!(bytes.len() > SNAPSHOT_HEADER_SIZE + 8 + 4);
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patterns.snap");
        let writer = SnapshotWriter::new(&path).unwrap();
        let params = IndexParams::with_dimension(4);

        let first = writer.write(&params, &GraphImage::empty(1)).unwrap();
        let second = writer.write(&params, &GraphImage::empty(2)).unwrap();
        assert!(second.created_at >= first.created_at);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            second.bytes_written
        );
    }

    #[test]
    fn test_cleanup_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("patterns.snap");
        std::fs::write(temp_path_for(&path), b"partial").unwrap();

        assert!(cleanup_temp_file(&path).unwrap());
        assert!(!cleanup_temp_file(&path).unwrap());
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let temp = temp_path_for(Path::new("/data/patterns.snap"));
        assert_eq!(temp, PathBuf::from("/data/.patterns.snap.tmp"));
    }
}
