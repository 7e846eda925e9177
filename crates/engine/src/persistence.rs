//! Persistence Manager
//!
//! Owns the snapshot file and the capacity policy of the store:
//!
//! - `snapshot()`: point-in-time image under the read guard, written
//!   crash-safely; concurrent requests coalesce into the one in flight
//! - `restore()`: one-shot load at startup; anything unreadable or
//!   incompatible leaves the store empty
//! - scheduler: background thread taking a snapshot every interval, with a
//!   final one on shutdown
//! - variety pressure: evict low-value patterns once occupancy passes the
//!   configured limit

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use patternstore_core::{
    now_micros, CapacityConfig, NodeId, PatternError, PatternResult, PersistenceConfig,
};
use patternstore_durability::{
    cleanup_temp_file, SnapshotInfo, SnapshotReader, SnapshotWriter,
};

use crate::bus::EventBus;
use crate::events::{Notification, SnapshotAlert};
use crate::index::HnswGraph;
use crate::store::PatternStore;

/// Snapshot counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceStatus {
    /// Snapshots written successfully
    pub snapshots_written: u64,
    /// Requests skipped because a snapshot was in flight
    pub snapshots_skipped: u64,
    /// Failed snapshot attempts
    pub snapshot_failures: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Completion time of the last successful snapshot (micros)
    pub last_snapshot_at: Option<u64>,
    /// Message of the last failure
    pub last_error: Option<String>,
    /// Nodes evicted by variety pressure so far
    pub evicted_total: u64,
}

/// Result of a snapshot request
#[derive(Debug, Clone)]
pub enum SnapshotOutcome {
    /// Snapshot written
    Written(SnapshotInfo),
    /// Another snapshot was in flight
    Skipped,
    /// Persistence is disabled
    Disabled,
}

/// Result of the startup restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// No snapshot on disk
    NoSnapshot,
    /// Graph loaded exactly as persisted
    Restored {
        /// Nodes loaded
        node_count: usize,
        /// Entry point loaded
        entry_point: Option<NodeId>,
    },
    /// Snapshot unreadable or incompatible; store left empty
    Discarded {
        /// Why it was rejected
        reason: String,
    },
    /// Persistence is disabled
    Disabled,
}

/// Result of a pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Nodes evicted
    pub evicted: usize,
    /// Of those, how many were under the confidence threshold
    pub below_threshold: usize,
    /// Neighbor lists re-selected
    pub repaired_lists: usize,
    /// Whether the entry point moved
    pub entry_point_changed: bool,
    /// Node count after pruning
    pub node_count: usize,
}

struct SchedulerState {
    shutdown: bool,
    requested: bool,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
}

struct SchedulerHandle {
    shared: Arc<SchedulerShared>,
    thread: JoinHandle<()>,
}

/// Resets the in-flight flag when a snapshot attempt ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Snapshot, restore and capacity manager for one store
pub struct PersistenceManager {
    store: Arc<PatternStore>,
    config: PersistenceConfig,
    capacity: CapacityConfig,
    bus: Option<EventBus>,
    in_flight: AtomicBool,
    restored: AtomicBool,
    status: Mutex<PersistenceStatus>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl PersistenceManager {
    /// Create a manager; alerts go to `bus` when given
    pub fn new(
        store: Arc<PatternStore>,
        config: PersistenceConfig,
        capacity: CapacityConfig,
        bus: Option<EventBus>,
    ) -> Self {
        PersistenceManager {
            store,
            config,
            capacity,
            bus,
            in_flight: AtomicBool::new(false),
            restored: AtomicBool::new(false),
            status: Mutex::new(PersistenceStatus::default()),
            scheduler: Mutex::new(None),
        }
    }

    /// Persistence settings
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Counter snapshot
    pub fn status(&self) -> PersistenceStatus {
        self.status.lock().clone()
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Write a snapshot of the current graph
    ///
    /// Returns `Skipped` when another snapshot is in flight. Failures are
    /// counted and logged; after `failure_alert_threshold` consecutive
    /// failures an alert is published.
    pub fn snapshot(&self) -> PatternResult<SnapshotOutcome> {
        if !self.config.enabled {
            return Ok(SnapshotOutcome::Disabled);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.status.lock().snapshots_skipped += 1;
            return Ok(SnapshotOutcome::Skipped);
        }
        let _guard = InFlight(&self.in_flight);

        let (params, image) = self.store.capture();
        let result = SnapshotWriter::new(&self.config.snapshot_path)
            .map_err(|e| e.to_string())
            .and_then(|w| w.write(&params, &image).map_err(|e| e.to_string()));

        match result {
            Ok(info) => {
                {
                    let mut status = self.status.lock();
                    status.snapshots_written += 1;
                    status.consecutive_failures = 0;
                    status.last_snapshot_at = Some(info.created_at);
                    status.last_error = None;
                }
                info!(
                    target: "patternstore::persistence",
                    nodes = info.node_count,
                    bytes = info.bytes_written,
                    "Snapshot complete"
                );
                Ok(SnapshotOutcome::Written(info))
            }
            Err(msg) => {
                self.record_failure(&msg);
                Err(PatternError::Io(format!("snapshot failed: {}", msg)))
            }
        }
    }

    fn record_failure(&self, msg: &str) {
        let consecutive = {
            let mut status = self.status.lock();
            status.snapshot_failures += 1;
            status.consecutive_failures += 1;
            status.last_error = Some(msg.to_string());
            status.consecutive_failures
        };
        warn!(
            target: "patternstore::persistence",
            error = %msg,
            consecutive,
            "Snapshot failed"
        );

        let threshold = self.config.failure_alert_threshold;
        if threshold > 0 && consecutive == threshold {
            error!(
                target: "patternstore::persistence",
                consecutive,
                "Snapshot failure threshold reached"
            );
            if let Some(bus) = &self.bus {
                bus.publish(Notification::SnapshotAlert(SnapshotAlert {
                    consecutive_failures: consecutive,
                    last_error: msg.to_string(),
                }));
            }
        }
    }

    // ========================================================================
    // Restore
    // ========================================================================

    /// Load the snapshot into the store. Callable once.
    ///
    /// Corrupt, truncated, future-version or incompatible snapshots are
    /// reported as `Discarded` and the store keeps its current (empty)
    /// graph. A second call fails with `InvalidState`.
    pub fn restore(&self) -> PatternResult<RestoreOutcome> {
        if self.restored.swap(true, Ordering::AcqRel) {
            return Err(PatternError::InvalidState(
                "restore already ran for this store".to_string(),
            ));
        }
        if !self.config.enabled {
            return Ok(RestoreOutcome::Disabled);
        }

        let path = &self.config.snapshot_path;
        match cleanup_temp_file(path) {
            Ok(true) => info!(
                target: "patternstore::persistence",
                path = %path.display(),
                "Removed leftover snapshot temp file"
            ),
            Ok(false) => {}
            Err(e) => warn!(
                target: "patternstore::persistence",
                error = %e,
                "Could not remove snapshot temp file"
            ),
        }

        if !path.exists() {
            info!(target: "patternstore::persistence", "No snapshot found, starting empty");
            return Ok(RestoreOutcome::NoSnapshot);
        }

        let params = self.store.params();
        let loaded = SnapshotReader::load(path)
            .and_then(|loaded| loaded.check_compatible(&params).map(|_| loaded));
        let loaded = match loaded {
            Ok(l) => l,
            Err(e) => return Ok(self.discard(e.to_string())),
        };

        let entry_point = loaded.image.entry_point;
        let node_count = loaded.image.nodes.len();
        if let Err(e) = self.store.load_image(loaded.image) {
            return Ok(self.discard(e.to_string()));
        }

        info!(
            target: "patternstore::persistence",
            nodes = node_count,
            created_at = loaded.header.created_at,
            "Snapshot restored"
        );
        Ok(RestoreOutcome::Restored {
            node_count,
            entry_point,
        })
    }

    fn discard(&self, reason: String) -> RestoreOutcome {
        warn!(
            target: "patternstore::persistence",
            path = %self.config.snapshot_path.display(),
            reason = %reason,
            "Discarding snapshot, starting empty"
        );
        RestoreOutcome::Discarded { reason }
    }

    // ========================================================================
    // Variety Pressure
    // ========================================================================

    /// node_count / max_capacity
    pub fn variety_pressure(&self) -> f64 {
        self.store.len() as f64 / self.capacity.max_capacity as f64
    }

    /// Prune when pressure has reached the limit
    pub fn prune_if_needed(&self) -> Option<PruneReport> {
        if self.variety_pressure() >= self.capacity.pressure_limit {
            Some(self.prune())
        } else {
            None
        }
    }

    /// Evict down to the target occupancy
    ///
    /// Selection and removal happen under one write guard.
    pub fn prune(&self) -> PruneReport {
        let capacity = self.capacity.clone();
        let report = self.store.with_graph_mut(|graph| {
            let (victims, below_threshold) = select_victims(graph, &capacity);
            let removal = graph.remove_nodes(&victims);
            PruneReport {
                evicted: removal.removed,
                below_threshold,
                repaired_lists: removal.repaired_lists,
                entry_point_changed: removal.entry_point_changed,
                node_count: graph.len(),
            }
        });

        self.status.lock().evicted_total += report.evicted as u64;
        info!(
            target: "patternstore::persistence",
            evicted = report.evicted,
            below_threshold = report.below_threshold,
            remaining = report.node_count,
            "Variety pressure prune"
        );
        report
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// Start the interval snapshot thread (no-op when disabled or running)
    pub fn start_scheduler(self: &Arc<Self>) -> PatternResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            return Ok(());
        }

        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                shutdown: false,
                requested: false,
            }),
            wake: Condvar::new(),
        });
        let manager = Arc::clone(self);
        let thread_shared = Arc::clone(&shared);
        let interval = self.config.snapshot_interval().max(Duration::from_millis(1));
        let thread = std::thread::Builder::new()
            .name("patternstore-snapshot".to_string())
            .spawn(move || scheduler_loop(&manager, &thread_shared, interval))?;

        *slot = Some(SchedulerHandle { shared, thread });
        Ok(())
    }

    /// Ask the scheduler thread for a snapshot now
    pub fn request_snapshot(&self) {
        if let Some(handle) = self.scheduler.lock().as_ref() {
            handle.shared.state.lock().requested = true;
            handle.shared.wake.notify_one();
        }
    }

    /// Stop the scheduler thread and wait for it
    pub fn stop_scheduler(&self) {
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            {
                let mut state = handle.shared.state.lock();
                state.shutdown = true;
                handle.shared.wake.notify_all();
            }
            let _ = handle.thread.join();
        }
    }

    /// Stop the scheduler and take a final snapshot
    pub fn shutdown(&self) -> PatternResult<SnapshotOutcome> {
        self.stop_scheduler();
        self.snapshot()
    }
}

fn scheduler_loop(manager: &PersistenceManager, shared: &SchedulerShared, interval: Duration) {
    loop {
        {
            let mut state = shared.state.lock();
            if !state.shutdown && !state.requested {
                shared.wake.wait_for(&mut state, interval);
            }
            if state.shutdown {
                return;
            }
            state.requested = false;
        }
        // Failures are counted and logged inside snapshot()
        let _ = manager.snapshot();
    }
}

/// Eviction victims in order: confidence asc, inserted_at asc, id asc
///
/// Everything under the confidence threshold goes, then the order
/// continues until the target count is met. Returns the victims and how
/// many were under the threshold.
pub(crate) fn select_victims(graph: &HnswGraph, capacity: &CapacityConfig) -> (Vec<NodeId>, usize) {
    let mut order: Vec<(f32, u64, NodeId)> = graph
        .iter()
        .map(|n| (n.metadata.confidence, n.metadata.inserted_at, n.id))
        .collect();
    order.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let below = order
        .iter()
        .take_while(|(c, _, _)| *c < capacity.prune_confidence_threshold)
        .count();
    let excess = order.len().saturating_sub(capacity.target_count());
    let count = below.max(excess);
    let victims = order.into_iter().take(count).map(|(_, _, id)| id).collect();
    (victims, below)
}
