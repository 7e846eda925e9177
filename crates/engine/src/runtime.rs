//! Assembled pattern store: store + persistence + gateway
//!
//! `open` restores the last snapshot, then starts the snapshot scheduler,
//! the drain worker and the bus pump. `shutdown` stops intake, drains what
//! was admitted and writes a final snapshot.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use patternstore_core::{
    NodeId, PatternMetadata, PatternResult, SearchHit, StoreConfig, CONFIG_FILE_NAME,
};

use crate::bus::EventBus;
use crate::ingest::IngestionGateway;
use crate::monitoring::{HealthStatus, MonitoringReport};
use crate::persistence::{PersistenceManager, RestoreOutcome, SnapshotOutcome};
use crate::store::{IndexStats, PatternStore};

/// Running pattern store
pub struct PatternStoreRuntime {
    config: StoreConfig,
    store: Arc<PatternStore>,
    persistence: Arc<PersistenceManager>,
    gateway: Arc<IngestionGateway>,
    bus: EventBus,
    restore: RestoreOutcome,
    stopped: AtomicBool,
}

impl PatternStoreRuntime {
    /// Validate `config`, restore and start background workers
    pub fn open(config: StoreConfig, bus: EventBus) -> PatternResult<Self> {
        config.validate()?;

        let store = Arc::new(PatternStore::new(config.index.clone())?);
        let persistence = Arc::new(PersistenceManager::new(
            Arc::clone(&store),
            config.persistence.clone(),
            config.capacity.clone(),
            Some(bus.clone()),
        ));
        let restore = persistence.restore()?;

        let gateway = Arc::new(IngestionGateway::new(
            Arc::clone(&store),
            Some(Arc::clone(&persistence)),
            bus.clone(),
            config.ingest.clone(),
        ));

        persistence.start_scheduler()?;
        gateway.start_drainer()?;
        gateway.start_pump()?;

        info!(
            target: "patternstore::index",
            nodes = store.len(),
            dimension = config.index.dimension,
            metric = config.index.metric.name(),
            "Pattern store opened"
        );

        Ok(PatternStoreRuntime {
            config,
            store,
            persistence,
            gateway,
            bus,
            restore,
            stopped: AtomicBool::new(false),
        })
    }

    /// Open with `patternstore.toml` from `dir`, writing the default if absent
    pub fn open_dir(dir: &Path, bus: EventBus) -> PatternResult<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&path)?;
        let mut config = StoreConfig::from_file(&path)?;
        if config.persistence.snapshot_path.is_relative() {
            config.persistence.snapshot_path = dir.join(&config.persistence.snapshot_path);
        }
        Self::open(config, bus)
    }

    /// Effective configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// What the startup restore did
    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore
    }

    /// The index
    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// The ingestion gateway
    pub fn gateway(&self) -> &Arc<IngestionGateway> {
        &self.gateway
    }

    /// The persistence manager
    pub fn persistence(&self) -> &Arc<PersistenceManager> {
        &self.persistence
    }

    /// The bus this runtime publishes on
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Insert directly, bypassing the gateway
    ///
    /// A fingerprint already carried by a live node is refused with
    /// `InvalidState`; use the gateway for dedup-aware intake.
    pub fn insert(&self, vector: Vec<f32>, metadata: PatternMetadata) -> PatternResult<NodeId> {
        self.store.insert(vector, metadata)
    }

    /// k nearest patterns
    pub fn search(&self, query: &[f32], k: usize) -> PatternResult<Vec<SearchHit>> {
        self.store.search(query, k)
    }

    /// Index statistics
    pub fn stats(&self) -> IndexStats {
        self.store.stats()
    }

    /// Combined monitoring view
    pub fn report(&self) -> MonitoringReport {
        let ingest = self.gateway.metrics();
        let persistence = self
            .config
            .persistence
            .enabled
            .then(|| self.persistence.status());
        let health = HealthStatus::derive(
            ingest.backpressure_active,
            persistence.as_ref(),
            self.config.persistence.failure_alert_threshold,
        );
        MonitoringReport {
            index: self.store.stats(),
            ingest,
            persistence,
            health,
        }
    }

    /// Stop intake, drain, stop the scheduler and take a final snapshot
    ///
    /// Idempotent: later calls return `Disabled` without doing anything.
    pub fn shutdown(&self) -> PatternResult<SnapshotOutcome> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(SnapshotOutcome::Disabled);
        }
        self.gateway.shutdown();
        let outcome = self.persistence.shutdown();
        info!(target: "patternstore::index", nodes = self.store.len(), "Pattern store stopped");
        outcome
    }
}

impl Drop for PatternStoreRuntime {
    fn drop(&mut self) {
        // Errors were already logged by the persistence manager
        let _ = self.shutdown();
    }
}
