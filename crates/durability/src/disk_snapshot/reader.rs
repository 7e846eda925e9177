//! Snapshot reader for restore
//!
//! Loads and validates snapshot files. Any failure here is a consistency
//! error: the caller falls back to an empty graph instead of loading part
//! of a snapshot.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use patternstore_core::{IndexParams, PatternError};

use crate::format::{GraphImage, SnapshotHeader, SNAPSHOT_HEADER_SIZE};

/// Minimum file size: header + body length + CRC32
const MIN_SNAPSHOT_SIZE: usize = SNAPSHOT_HEADER_SIZE + 8 + 4;

/// Snapshot reader
pub struct SnapshotReader;

impl SnapshotReader {
    /// Load a snapshot from file
    ///
    /// Validates magic bytes, format version, CRC, header/body agreement and
    /// the structural invariants of the decoded graph image.
    pub fn load(path: &Path) -> Result<LoadedSnapshot, SnapshotReadError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len() as usize;

        if file_size < MIN_SNAPSHOT_SIZE {
            return Err(SnapshotReadError::FileTooSmall { size: file_size });
        }

        let mut reader = BufReader::new(file);

        // Read and validate header
        let mut header_bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header =
            SnapshotHeader::from_bytes(&header_bytes).ok_or(SnapshotReadError::InvalidHeader)?;
        header
            .validate()
            .map_err(|e| SnapshotReadError::HeaderValidation(e.to_string()))?;

        // Read the rest for CRC validation
        let mut remaining = Vec::with_capacity(file_size - SNAPSHOT_HEADER_SIZE);
        reader.read_to_end(&mut remaining)?;
        if remaining.len() < 8 + 4 {
            return Err(SnapshotReadError::FileTooSmall { size: file_size });
        }

        let (payload, crc_bytes) = remaining.split_at(remaining.len() - 4);
        let stored_crc = u32::from_le_bytes(
            crc_bytes
                .try_into()
                .map_err(|_| SnapshotReadError::InvalidHeader)?,
        );

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(payload);
        let computed_crc = hasher.finalize();
        if stored_crc != computed_crc {
            return Err(SnapshotReadError::CrcMismatch {
                stored: stored_crc,
                computed: computed_crc,
            });
        }

        let (len_bytes, body) = payload.split_at(8);
        let body_len = u64::from_le_bytes(
            len_bytes
                .try_into()
                .map_err(|_| SnapshotReadError::InvalidHeader)?,
        ) as usize;
        if body_len != body.len() {
            return Err(SnapshotReadError::BodyLengthMismatch {
                declared: body_len,
                actual: body.len(),
            });
        }

        let image: GraphImage =
            rmp_serde::from_slice(body).map_err(|e| SnapshotReadError::Decode(e.to_string()))?;

        if image.nodes.len() as u64 != header.node_count {
            return Err(SnapshotReadError::Inconsistent(format!(
                "header lists {} nodes, body holds {}",
                header.node_count,
                image.nodes.len()
            )));
        }
        if image.entry_point.map(|id| id.as_u64()) != header.entry_point() {
            return Err(SnapshotReadError::Inconsistent(
                "header and body disagree on the entry point".to_string(),
            ));
        }
        image
            .validate(header.dimension as usize, header.max_degree as usize)
            .map_err(SnapshotReadError::Inconsistent)?;

        Ok(LoadedSnapshot {
            header,
            image,
            crc: stored_crc,
        })
    }
}

/// Loaded snapshot data
#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    /// Snapshot header
    pub header: SnapshotHeader,
    /// Decoded, validated graph image
    pub image: GraphImage,
    /// CRC32 checksum
    pub crc: u32,
}

impl LoadedSnapshot {
    /// Check that this snapshot can be loaded into an index built with `params`.
    ///
    /// Dimension, metric and degree cap must match. Search widths are tuning
    /// knobs and may differ.
    pub fn check_compatible(&self, params: &IndexParams) -> Result<(), SnapshotReadError> {
        let header = &self.header;
        if header.dimension as usize != params.dimension {
            return Err(SnapshotReadError::Incompatible {
                field: "dimension",
                snapshot: header.dimension.to_string(),
                configured: params.dimension.to_string(),
            });
        }
        if header.metric() != Some(params.metric) {
            return Err(SnapshotReadError::Incompatible {
                field: "metric",
                snapshot: header.metric.to_string(),
                configured: params.metric.name().to_string(),
            });
        }
        if header.max_degree as usize != params.max_degree {
            return Err(SnapshotReadError::Incompatible {
                field: "max_degree",
                snapshot: header.max_degree.to_string(),
                configured: params.max_degree.to_string(),
            });
        }
        Ok(())
    }

    /// Get the creation timestamp
    pub fn created_at(&self) -> u64 {
        self.header.created_at
    }
}

/// Errors that can occur when reading a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotReadError {
    /// File is too small to be a valid snapshot
    #[error("Snapshot file too small: {size} bytes")]
    FileTooSmall {
        /// Actual file size
        size: usize,
    },
    /// Invalid snapshot header
    #[error("Invalid snapshot header")]
    InvalidHeader,
    /// Header validation failed (magic, version)
    #[error("Header validation failed: {0}")]
    HeaderValidation(String),
    /// CRC mismatch
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// CRC stored in file
        stored: u32,
        /// CRC computed from data
        computed: u32,
    },
    /// Declared body length disagrees with the file
    #[error("Body length mismatch: declared {declared}, found {actual}")]
    BodyLengthMismatch {
        /// Declared length
        declared: usize,
        /// Bytes present
        actual: usize,
    },
    /// Body could not be decoded
    #[error("Snapshot decode error: {0}")]
    Decode(String),
    /// Decoded graph violates an invariant
    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
    /// Snapshot was built with different index parameters
    #[error("Incompatible snapshot: {field} is {snapshot}, configured {configured}")]
    Incompatible {
        /// Parameter name
        field: &'static str,
        /// Value in the snapshot
        snapshot: String,
        /// Value configured
        configured: String,
    },
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SnapshotReadError> for PatternError {
    fn from(e: SnapshotReadError) -> Self {
        match e {
            SnapshotReadError::Io(io) => PatternError::Io(io.to_string()),
            other => PatternError::Snapshot(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_snapshot::writer::SnapshotWriter;
    use crate::format::NodeImage;
    use patternstore_core::{DistanceMetric, NodeId, PatternMetadata};
    use tempfile::TempDir;

    fn two_node_image() -> GraphImage {
        let meta = |t| PatternMetadata::new(0.9, "unit", "test").with_inserted_at(t);
        GraphImage {
            entry_point: Some(NodeId::new(0)),
            max_layer: 0,
            rng_seed: 42,
            rng_counter: 2,
            next_id: 2,
            nodes: vec![
                NodeImage {
                    id: NodeId::new(0),
                    vector: vec![1.0, 0.0],
                    metadata: meta(1),
                    neighbors: vec![vec![NodeId::new(1)]],
                },
                NodeImage {
                    id: NodeId::new(1),
                    vector: vec![0.0, 1.0],
                    metadata: meta(2),
                    neighbors: vec![vec![NodeId::new(0)]],
                },
            ],
        }
    }

    fn write_snapshot(dir: &TempDir) -> (std::path::PathBuf, IndexParams) {
        let path = dir.path().join("patterns.snap");
        let params = IndexParams::with_dimension(2);
        SnapshotWriter::new(&path)
            .unwrap()
            .write(&params, &two_node_image())
            .unwrap();
        (path, params)
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let (path, params) = write_snapshot(&dir);

        let loaded = SnapshotReader::load(&path).unwrap();
        loaded.check_compatible(&params).unwrap();
        assert_eq!(loaded.image, two_node_image());
        assert_eq!(loaded.header.node_count, 2);
        assert_eq!(loaded.header.entry_point(), Some(0));
    }

    #[test]
    fn test_detects_flipped_byte() {
        let dir = TempDir::new().unwrap();
        let (path, _) = write_snapshot(&dir);

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = SNAPSHOT_HEADER_SIZE + 10;
        bytes[mid] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            SnapshotReader::load(&path),
            Err(SnapshotReadError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_detects_truncation() {
        let dir = TempDir::new().unwrap();
        let (path, _) = write_snapshot(&dir);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 9]).unwrap();
        assert!(SnapshotReader::load(&path).is_err());

        std::fs::write(&path, &bytes[..20]).unwrap();
        assert!(matches!(
            SnapshotReader::load(&path),
            Err(SnapshotReadError::FileTooSmall { .. })
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let dir = TempDir::new().unwrap();
        let (path, _) = write_snapshot(&dir);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            SnapshotReader::load(&path),
            Err(SnapshotReadError::HeaderValidation(_))
        ));
    }

    #[test]
    fn test_incompatible_params() {
        let dir = TempDir::new().unwrap();
        let (path, params) = write_snapshot(&dir);
        let loaded = SnapshotReader::load(&path).unwrap();

        let wrong_dim = IndexParams::with_dimension(3);
        assert!(matches!(
            loaded.check_compatible(&wrong_dim),
            Err(SnapshotReadError::Incompatible { field: "dimension", .. })
        ));

        let wrong_metric = IndexParams {
            metric: DistanceMetric::Euclidean,
            ..params.clone()
        };
        assert!(loaded.check_compatible(&wrong_metric).is_err());

        let other_widths = IndexParams {
            ef_search: 7,
            ..params
        };
        loaded.check_compatible(&other_widths).unwrap();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = SnapshotReader::load(&dir.path().join("nope.snap")).unwrap_err();
        assert!(matches!(err, SnapshotReadError::Io(_)));
        assert!(matches!(PatternError::from(err), PatternError::Io(_)));
    }
}
