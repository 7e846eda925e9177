//! Snapshot file format
//!
//! A snapshot holds the complete pattern graph plus the index parameters it
//! was built with.
//!
//! # File Structure
//!
//! ```text
//! +------------------+ 0
//! | SnapshotHeader   | 64 bytes
//! +------------------+ 64
//! | Body length      | u64 LE
//! +------------------+ 72
//! | Body             | MessagePack GraphImage
//! +------------------+
//! | Footer CRC32     | 4 bytes, over everything above
//! +------------------+
//! ```

use patternstore_core::{DistanceMetric, IndexParams};

/// Magic bytes: "PSNP"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"PSNP";

/// Snapshot format version. Readers accept exactly this version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshot header size in bytes
pub const SNAPSHOT_HEADER_SIZE: usize = 64;

/// Snapshot header (64 bytes)
///
/// Carries enough to reject an incompatible snapshot without decoding the
/// body: format version, dimensionality, metric and degree cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes: "PSNP"
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Embedding dimensionality
    pub dimension: u32,
    /// Distance metric tag (`DistanceMetric::to_byte`)
    pub metric: u8,
    /// Whether `entry_point` is meaningful (0 for an empty graph)
    pub has_entry: u8,
    /// Degree cap `M`
    pub max_degree: u32,
    /// Build-time beam width
    pub ef_construction: u32,
    /// Query-time beam width
    pub ef_search: u32,
    /// Number of nodes in the body
    pub node_count: u64,
    /// Entry-point node id
    pub entry_point: u64,
    /// Creation timestamp (microseconds since epoch)
    pub created_at: u64,
}

impl SnapshotHeader {
    /// Create a header for the given parameters and graph summary
    pub fn new(
        params: &IndexParams,
        node_count: u64,
        entry_point: Option<u64>,
        created_at: u64,
    ) -> Self {
        SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            format_version: SNAPSHOT_FORMAT_VERSION,
            dimension: params.dimension as u32,
            metric: params.metric.to_byte(),
            has_entry: u8::from(entry_point.is_some()),
            max_degree: params.max_degree as u32,
            ef_construction: params.ef_construction as u32,
            ef_search: params.ef_search as u32,
            node_count,
            entry_point: entry_point.unwrap_or(0),
            created_at,
        }
    }

    /// Entry point, if the graph was non-empty
    pub fn entry_point(&self) -> Option<u64> {
        (self.has_entry == 1).then_some(self.entry_point)
    }

    /// Decoded metric, if the tag is known
    pub fn metric(&self) -> Option<DistanceMetric> {
        DistanceMetric::from_byte(self.metric)
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; SNAPSHOT_HEADER_SIZE] {
        let mut bytes = [0u8; SNAPSHOT_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        bytes[12] = self.metric;
        bytes[13] = self.has_entry;
        // 14..16 reserved
        bytes[16..20].copy_from_slice(&self.max_degree.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.ef_construction.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.ef_search.to_le_bytes());
        // 28..32 reserved
        bytes[32..40].copy_from_slice(&self.node_count.to_le_bytes());
        bytes[40..48].copy_from_slice(&self.entry_point.to_le_bytes());
        bytes[48..56].copy_from_slice(&self.created_at.to_le_bytes());
        // 56..64 reserved
        bytes
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; SNAPSHOT_HEADER_SIZE]) -> Option<Self> {
        Some(SnapshotHeader {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            dimension: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            metric: bytes[12],
            has_entry: bytes[13],
            max_degree: u32::from_le_bytes(bytes[16..20].try_into().ok()?),
            ef_construction: u32::from_le_bytes(bytes[20..24].try_into().ok()?),
            ef_search: u32::from_le_bytes(bytes[24..28].try_into().ok()?),
            node_count: u64::from_le_bytes(bytes[32..40].try_into().ok()?),
            entry_point: u64::from_le_bytes(bytes[40..48].try_into().ok()?),
            created_at: u64::from_le_bytes(bytes[48..56].try_into().ok()?),
        })
    }

    /// Validate magic and version
    pub fn validate(&self) -> Result<(), SnapshotHeaderError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotHeaderError::InvalidMagic {
                expected: SNAPSHOT_MAGIC,
                actual: self.magic,
            });
        }
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotHeaderError::UnsupportedVersion {
                version: self.format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        if self.has_entry > 1 {
            return Err(SnapshotHeaderError::InvalidFlag {
                value: self.has_entry,
            });
        }
        if self.has_entry == 0 && self.node_count != 0 {
            return Err(SnapshotHeaderError::MissingEntryPoint {
                node_count: self.node_count,
            });
        }
        Ok(())
    }
}

/// Errors that can occur when validating a snapshot header
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotHeaderError {
    /// Invalid magic bytes
    #[error("Invalid magic bytes: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes
        expected: [u8; 4],
        /// Actual magic bytes found
        actual: [u8; 4],
    },
    /// Format version other than the one this build reads
    #[error("Unsupported snapshot version {version}, this build reads version {supported}")]
    UnsupportedVersion {
        /// Version found in the file
        version: u32,
        /// The only supported version
        supported: u32,
    },
    /// Entry flag was neither 0 nor 1
    #[error("Invalid entry-point flag {value}")]
    InvalidFlag {
        /// Flag value found
        value: u8,
    },
    /// Non-empty graph without an entry point
    #[error("Header lists {node_count} nodes but no entry point")]
    MissingEntryPoint {
        /// Node count found
        node_count: u64,
    },
}
