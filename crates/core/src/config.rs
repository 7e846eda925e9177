//! Pattern store configuration via `patternstore.toml`
//!
//! Every field has a default, so an empty file (or a file with only the
//! sections you care about) is valid. On first start a commented default
//! file is written next to the data; edit it and restart to change settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PatternError, PatternResult};
use crate::limits::{MAX_DEGREE, MAX_QUEUE_CAPACITY, MAX_VECTOR_DIM};
use crate::types::DistanceMetric;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "patternstore.toml";

/// Current fingerprint scheme. Bumping it invalidates every fingerprint.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Index parameters (`[index]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Embedding dimensionality
    pub dimension: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Max connections per layer above 0 (`M`); layer 0 allows `2*M`
    pub max_degree: usize,
    /// Build-time beam width
    pub ef_construction: usize,
    /// Default query-time beam width
    pub ef_search: usize,
    /// Seed for layer assignment
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            dimension: 100,
            metric: DistanceMetric::Cosine,
            max_degree: 16,
            ef_construction: 200,
            ef_search: 50,
            seed: 42,
        }
    }
}

impl IndexParams {
    /// Parameters for a given dimension, everything else default
    pub fn with_dimension(dimension: usize) -> Self {
        IndexParams {
            dimension,
            ..IndexParams::default()
        }
    }

    /// Degree cap for a layer: `2*M` on layer 0, `M` above
    pub fn degree_cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_degree * 2
        } else {
            self.max_degree
        }
    }

    /// Level multiplier: 1/ln(M)
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.max_degree as f64).ln()
    }

    /// Check the parameters an index can be built with
    pub fn validate(&self) -> PatternResult<()> {
        if self.dimension == 0 || self.dimension > MAX_VECTOR_DIM {
            return Err(PatternError::InvalidConfig(format!(
                "index.dimension must be in 1..={}, got {}",
                MAX_VECTOR_DIM, self.dimension
            )));
        }
        if self.max_degree < 2 || self.max_degree > MAX_DEGREE {
            return Err(PatternError::InvalidConfig(format!(
                "index.max_degree must be in 2..={}, got {}",
                MAX_DEGREE, self.max_degree
            )));
        }
        if self.ef_construction < self.max_degree {
            return Err(PatternError::InvalidConfig(format!(
                "index.ef_construction ({}) must be >= max_degree ({})",
                self.ef_construction, self.max_degree
            )));
        }
        if self.ef_search == 0 {
            return Err(PatternError::InvalidConfig(
                "index.ef_search must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Snapshot settings (`[persistence]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether snapshots are written and restored at all
    pub enabled: bool,
    /// Snapshot file location
    pub snapshot_path: PathBuf,
    /// Interval between scheduled snapshots
    pub snapshot_interval_secs: u64,
    /// Consecutive snapshot failures before an alert is published
    pub failure_alert_threshold: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            enabled: true,
            snapshot_path: PathBuf::from("data/patterns.snap"),
            snapshot_interval_secs: 300,
            failure_alert_threshold: 3,
        }
    }
}

impl PersistenceConfig {
    /// Snapshot interval as a `Duration`
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

/// Capacity and variety-pressure settings (`[capacity]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Maximum number of stored patterns
    pub max_capacity: usize,
    /// node_count / max_capacity above which pruning triggers
    pub pressure_limit: f64,
    /// Occupancy pruning reduces to
    pub target_occupancy: f64,
    /// Nodes below this confidence are swept whenever pruning runs
    pub prune_confidence_threshold: f32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        CapacityConfig {
            max_capacity: 100_000,
            pressure_limit: 0.8,
            target_occupancy: 0.7,
            prune_confidence_threshold: 0.1,
        }
    }
}

impl CapacityConfig {
    /// Node count pruning reduces to
    pub fn target_count(&self) -> usize {
        (self.target_occupancy * self.max_capacity as f64).floor() as usize
    }

    fn validate(&self) -> PatternResult<()> {
        if self.max_capacity == 0 {
            return Err(PatternError::InvalidConfig(
                "capacity.max_capacity must be > 0".to_string(),
            ));
        }
        if !(self.target_occupancy > 0.0
            && self.target_occupancy < self.pressure_limit
            && self.pressure_limit <= 1.0)
        {
            return Err(PatternError::InvalidConfig(format!(
                "capacity requires 0 < target_occupancy ({}) < pressure_limit ({}) <= 1",
                self.target_occupancy, self.pressure_limit
            )));
        }
        Ok(())
    }
}

/// Ingestion gateway settings (`[ingest]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Queue occupancy that enters backpressure mode
    pub queue_high_water: usize,
    /// Queue occupancy below which backpressure mode exits
    pub queue_low_water: usize,
    /// Max records per drained batch
    pub batch_size: usize,
    /// Max wait before a partial batch is flushed
    pub batch_timeout_ms: u64,
    /// How long a fingerprint stays in the dedup window
    pub dedup_window_ms: u64,
    /// Max fingerprints tracked by the dedup window
    pub dedup_window_entries: usize,
    /// Quantization steps per unit used for fingerprinting
    pub quantization_levels: u32,
    /// Fingerprint scheme version tag
    pub fingerprint_version: u32,
    /// Intensity at which a record is forwarded as an algedonic signal
    pub algedonic_threshold: f32,
    /// Publish a stats update every N batches (0 disables)
    pub stats_every_batches: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            queue_high_water: 1000,
            queue_low_water: 500,
            batch_size: 64,
            batch_timeout_ms: 100,
            dedup_window_ms: 5000,
            dedup_window_entries: 10_000,
            quantization_levels: 100,
            fingerprint_version: FINGERPRINT_VERSION,
            algedonic_threshold: 0.8,
            stats_every_batches: 10,
        }
    }
}

impl IngestConfig {
    /// Batch flush timeout as a `Duration`
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Dedup window length as a `Duration`
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    fn validate(&self) -> PatternResult<()> {
        if self.queue_high_water == 0 || self.queue_high_water > MAX_QUEUE_CAPACITY {
            return Err(PatternError::InvalidConfig(format!(
                "ingest.queue_high_water must be in 1..={}, got {}",
                MAX_QUEUE_CAPACITY, self.queue_high_water
            )));
        }
        if self.queue_low_water >= self.queue_high_water {
            return Err(PatternError::InvalidConfig(format!(
                "ingest.queue_low_water ({}) must be < queue_high_water ({})",
                self.queue_low_water, self.queue_high_water
            )));
        }
        if self.batch_size == 0 {
            return Err(PatternError::InvalidConfig(
                "ingest.batch_size must be > 0".to_string(),
            ));
        }
        if self.quantization_levels == 0 {
            return Err(PatternError::InvalidConfig(
                "ingest.quantization_levels must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pattern store configuration loaded from `patternstore.toml`.
///
/// # Example
///
/// ```toml
/// [index]
/// dimension = 64
/// max_degree = 16
///
/// [persistence]
/// snapshot_path = "/var/lib/patterns/patterns.snap"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `[index]` section
    pub index: IndexParams,
    /// `[persistence]` section
    pub persistence: PersistenceConfig,
    /// `[capacity]` section
    pub capacity: CapacityConfig,
    /// `[ingest]` section
    pub ingest: IngestConfig,
}

impl StoreConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `PatternError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> PatternResult<()> {
        self.index.validate()?;
        self.capacity.validate()?;
        self.ingest.validate()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Pattern store configuration

[index]
# Embedding dimensionality produced by upstream pattern sources
dimension = 100
# "cosine" (default) or "euclidean"
metric = "cosine"
# Max connections per layer (layer 0 allows twice this)
max_degree = 16
ef_construction = 200
ef_search = 50
seed = 42

[persistence]
enabled = true
snapshot_path = "data/patterns.snap"
snapshot_interval_secs = 300
# Consecutive snapshot failures before an alert is published
failure_alert_threshold = 3

[capacity]
max_capacity = 100000
# Pruning triggers above this occupancy and reduces to target_occupancy
pressure_limit = 0.8
target_occupancy = 0.7
prune_confidence_threshold = 0.1

[ingest]
queue_high_water = 1000
queue_low_water = 500
batch_size = 64
batch_timeout_ms = 100
dedup_window_ms = 5000
dedup_window_entries = 10000
quantization_levels = 100
fingerprint_version = 1
algedonic_threshold = 0.8
stats_every_batches = 10
"#
    }

    /// Parse config from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> PatternResult<Self> {
        let config: StoreConfig = toml::from_str(content)
            .map_err(|e| PatternError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> PatternResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PatternError::Io(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PatternError::InvalidConfig(msg) => {
                PatternError::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> PatternResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                PatternError::Io(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> PatternResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PatternError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            PatternError::Io(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
