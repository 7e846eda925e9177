//! Pattern Ingestion Gateway
//!
//! Admission path (`on_pattern_event`, caller's thread):
//! resolve vector -> validate -> fingerprint -> dedup window -> queue.
//!
//! Drain path (`drain_batch`, drain worker or caller): pop one bounded
//! batch, insert each record, publish per-source summaries, consult the
//! Persistence Manager for capacity pressure.
//!
//! Drains are serialized so records reach the index in admission order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use patternstore_core::{
    now_micros, IngestConfig, PatternError, PatternMetadata, PatternResult,
};

use crate::bus::EventBus;
use crate::events::{
    AlgedonicSignal, IndexSummary, Notification, StatsUpdate, TOPIC_PATTERNS_EXTRACTED,
    TOPIC_PATTERN_MATCHED,
};
use crate::ingest::dedup::DedupWindow;
use crate::ingest::fingerprint::Fingerprinter;
use crate::ingest::queue::{Admission, IngestQueue, QueuedRecord};
use crate::ingest::record::PatternRecord;
use crate::ingest::vectorize::PatternVectorizer;
use crate::monitoring::{HealthStatus, IngestMetrics};
use crate::persistence::{PersistenceManager, PruneReport};
use crate::store::{InsertOutcome, PatternStore};

/// How long the pump waits on the bus before rechecking its stop flag
const PUMP_POLL: Duration = Duration::from_millis(50);

/// What happened to one submitted record
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Queued
    Enqueued,
    /// Queued, displacing a weaker queued record
    Displaced,
    /// Dropped by backpressure
    Shed,
    /// Seen within the dedup window
    Duplicate,
    /// Failed validation
    Rejected(PatternError),
}

impl SubmitOutcome {
    /// Whether the record is now waiting in the queue
    pub fn is_admitted(&self) -> bool {
        matches!(self, SubmitOutcome::Enqueued | SubmitOutcome::Displaced)
    }
}

/// Result of one drained batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Records taken from the queue
    pub records: usize,
    /// New nodes
    pub indexed: u64,
    /// Records whose fingerprint was already indexed
    pub deduplicated: u64,
    /// Records the index rejected
    pub errors: u64,
    /// Summaries published, one per source
    pub summaries: Vec<IndexSummary>,
    /// Pruning triggered by this batch
    pub pruned: Option<PruneReport>,
}

impl BatchReport {
    fn is_empty(&self) -> bool {
        self.records == 0 && self.summaries.is_empty()
    }
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    indexed: AtomicU64,
    deduplicated: AtomicU64,
    dropped: AtomicU64,
    index_errors: AtomicU64,
    batches: AtomicU64,
}

struct GatewayState {
    queue: IngestQueue,
    dedup: DedupWindow,
    /// Window duplicates per source awaiting the next summary
    pending_dedup: BTreeMap<String, u64>,
}

/// Dedup, backpressure and batching in front of a `PatternStore`
pub struct IngestionGateway {
    store: Arc<PatternStore>,
    persistence: Option<Arc<PersistenceManager>>,
    bus: EventBus,
    config: IngestConfig,
    failure_alert_threshold: u32,
    fingerprinter: Fingerprinter,
    vectorizer: PatternVectorizer,
    state: Mutex<GatewayState>,
    ready: Condvar,
    drain_lock: Mutex<()>,
    counters: Counters,
    shutdown: AtomicBool,
    pump_stop: AtomicBool,
    drainer: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionGateway {
    /// Create a gateway feeding `store`
    pub fn new(
        store: Arc<PatternStore>,
        persistence: Option<Arc<PersistenceManager>>,
        bus: EventBus,
        config: IngestConfig,
    ) -> Self {
        let dimension = store.dimension();
        let failure_alert_threshold = persistence
            .as_ref()
            .map_or(0, |p| p.config().failure_alert_threshold);
        IngestionGateway {
            fingerprinter: Fingerprinter::new(config.fingerprint_version, config.quantization_levels),
            vectorizer: PatternVectorizer::new(dimension),
            state: Mutex::new(GatewayState {
                queue: IngestQueue::new(config.queue_high_water, config.queue_low_water),
                dedup: DedupWindow::new(config.dedup_window(), config.dedup_window_entries),
                pending_dedup: BTreeMap::new(),
            }),
            store,
            persistence,
            bus,
            config,
            failure_alert_threshold,
            ready: Condvar::new(),
            drain_lock: Mutex::new(()),
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
            pump_stop: AtomicBool::new(false),
            drainer: Mutex::new(None),
            pump: Mutex::new(None),
        }
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Admit one pattern record
    pub fn on_pattern_event(&self, record: PatternRecord) -> SubmitOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let vector = match &record.vector {
            Some(v) => v.clone(),
            None => self.vectorizer.vectorize(&record),
        };
        if let Err(e) = self.validate(&vector) {
            self.counters.index_errors.fetch_add(1, Ordering::Relaxed);
            debug!(target: "patternstore::ingest", error = %e, "Rejected pattern record");
            return SubmitOutcome::Rejected(e);
        }

        let fingerprint = self.fingerprinter.fingerprint(&vector, &record.context_type);
        let metadata = PatternMetadata {
            confidence: record.effective_confidence(),
            source: record.source.clone(),
            context_type: record.context_type.clone(),
            pattern_id: record.pattern_id.clone(),
            inserted_at: 0,
            fingerprint: Some(fingerprint),
        };

        let now = Instant::now();
        let (admission, depth, entered_backpressure) = {
            let mut state = self.state.lock();
            if state.dedup.check_and_record(fingerprint, now) {
                *state.pending_dedup.entry(record.source.clone()).or_default() += 1;
                drop(state);
                self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
                return SubmitOutcome::Duplicate;
            }

            let was_backpressure = state.queue.in_backpressure();
            let admission = state.queue.push(QueuedRecord {
                vector,
                metadata,
                admitted_at: now,
            });
            // Shed records must not block a later resend
            match &admission {
                Admission::RejectedIncoming(r) | Admission::Displaced(r) => {
                    if let Some(fp) = r.metadata.fingerprint {
                        state.dedup.forget(fp);
                    }
                }
                Admission::Enqueued => {}
            }
            let entered = !was_backpressure && state.queue.in_backpressure();
            (admission, state.queue.len(), entered)
        };

        if entered_backpressure {
            warn!(
                target: "patternstore::ingest",
                depth,
                high_water = self.config.queue_high_water,
                "Ingest queue entered backpressure"
            );
        }

        let outcome = match admission {
            Admission::Enqueued => SubmitOutcome::Enqueued,
            Admission::Displaced(dropped) => {
                self.record_drop(&dropped);
                SubmitOutcome::Displaced
            }
            Admission::RejectedIncoming(dropped) => {
                self.record_drop(&dropped);
                SubmitOutcome::Shed
            }
        };

        if outcome.is_admitted() {
            if let Some(intensity) = record.intensity() {
                if intensity >= self.config.algedonic_threshold {
                    self.bus.publish(Notification::AlgedonicPattern(AlgedonicSignal {
                        record,
                        intensity,
                    }));
                }
            }
        }

        if depth >= self.config.batch_size {
            self.ready.notify_one();
        }
        outcome
    }

    /// Admit a bulk extraction; every record takes `source`
    pub fn on_patterns_extracted(
        &self,
        patterns: Vec<PatternRecord>,
        source: &str,
    ) -> Vec<SubmitOutcome> {
        patterns
            .into_iter()
            .map(|mut record| {
                record.source = source.to_string();
                self.on_pattern_event(record)
            })
            .collect()
    }

    /// Route an ingress notification; egress notifications are ignored
    pub fn handle_notification(&self, notification: Notification) {
        match notification {
            Notification::PatternMatched(record) => {
                self.on_pattern_event(record);
            }
            Notification::PatternsExtracted { patterns, source } => {
                self.on_patterns_extracted(patterns, &source);
            }
            _ => {}
        }
    }

    fn validate(&self, vector: &[f32]) -> PatternResult<()> {
        let expected = self.vectorizer.dimension();
        if vector.len() != expected {
            return Err(PatternError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(PatternError::InvalidVector {
                reason: "vector contains NaN or infinity".to_string(),
            });
        }
        Ok(())
    }

    fn record_drop(&self, dropped: &QueuedRecord) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "patternstore::ingest",
            confidence = dropped.metadata.confidence,
            source = %dropped.metadata.source,
            "Backpressure dropped record"
        );
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Index one batch from the front of the queue
    ///
    /// Per-record failures are counted and skipped; they never abort the
    /// batch and are not retried.
    pub fn drain_batch(&self) -> BatchReport {
        let _serial = self.drain_lock.lock();

        let (batch, pending_dedup, left_backpressure) = {
            let mut state = self.state.lock();
            let was = state.queue.in_backpressure();
            let batch = state.queue.pop_batch(self.config.batch_size);
            let left = was && !state.queue.in_backpressure();
            (batch, std::mem::take(&mut state.pending_dedup), left)
        };
        if left_backpressure {
            debug!(target: "patternstore::ingest", "Ingest queue left backpressure");
        }

        let mut report = BatchReport {
            records: batch.len(),
            ..BatchReport::default()
        };
        // source -> (indexed, deduplicated)
        let mut tally: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for (source, dups) in pending_dedup {
            tally.entry(source).or_default().1 += dups;
        }

        for record in batch {
            let source = record.metadata.source.clone();
            let metadata = record.metadata.with_inserted_at(now_micros());
            match self.store.insert_unique(record.vector, metadata) {
                Ok(InsertOutcome::Inserted(_)) => {
                    report.indexed += 1;
                    tally.entry(source).or_default().0 += 1;
                }
                Ok(InsertOutcome::Duplicate(_)) => {
                    report.deduplicated += 1;
                    tally.entry(source).or_default().1 += 1;
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        target: "patternstore::ingest",
                        error = %e,
                        source = %source,
                        "Insert failed, record dropped"
                    );
                }
            }
        }

        if report.is_empty() && tally.is_empty() {
            return report;
        }

        self.counters.indexed.fetch_add(report.indexed, Ordering::Relaxed);
        self.counters
            .deduplicated
            .fetch_add(report.deduplicated, Ordering::Relaxed);
        self.counters.index_errors.fetch_add(report.errors, Ordering::Relaxed);
        let batches = self.counters.batches.fetch_add(1, Ordering::Relaxed) + 1;

        for (source, (count, deduplicated)) in tally {
            let summary = IndexSummary {
                count,
                deduplicated,
                source,
            };
            self.bus.publish(Notification::PatternIndexed(summary.clone()));
            report.summaries.push(summary);
        }

        debug!(
            target: "patternstore::ingest",
            records = report.records,
            indexed = report.indexed,
            deduplicated = report.deduplicated,
            errors = report.errors,
            "Batch drained"
        );

        if let Some(persistence) = &self.persistence {
            report.pruned = persistence.prune_if_needed();
        }

        let every = self.config.stats_every_batches;
        if every > 0 && batches % every == 0 {
            self.bus.publish(Notification::StatsUpdate(self.stats_update()));
        }

        report
    }

    /// Drain until the queue is empty; returns records indexed
    pub fn flush(&self) -> u64 {
        let mut indexed = 0;
        loop {
            let report = self.drain_batch();
            indexed += report.indexed;
            if report.records == 0 {
                return indexed;
            }
        }
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// Counter snapshot
    pub fn metrics(&self) -> IngestMetrics {
        let (queue_depth, backpressure_active) = {
            let state = self.state.lock();
            (state.queue.len(), state.queue.in_backpressure())
        };
        IngestMetrics {
            received: self.counters.received.load(Ordering::Relaxed),
            indexed: self.counters.indexed.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            index_errors: self.counters.index_errors.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            queue_depth,
            backpressure_active,
        }
    }

    /// Health derived from queue and persistence state
    pub fn health(&self) -> HealthStatus {
        let status = self.persistence.as_ref().map(|p| p.status());
        HealthStatus::derive(
            self.metrics().backpressure_active,
            status.as_ref(),
            self.failure_alert_threshold,
        )
    }

    fn stats_update(&self) -> StatsUpdate {
        let metrics = self.metrics();
        StatsUpdate {
            index: self.store.stats(),
            queue_depth: metrics.queue_depth,
            batches: metrics.batches,
            health: self.health(),
        }
    }

    // ========================================================================
    // Workers
    // ========================================================================

    /// Start the drain worker (no-op if running)
    ///
    /// A batch is drained as soon as `batch_size` records are queued or
    /// `batch_timeout` has passed, whichever comes first.
    pub fn start_drainer(self: &Arc<Self>) -> PatternResult<()> {
        let mut slot = self.drainer.lock();
        if slot.is_some() {
            return Ok(());
        }
        let gateway = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("patternstore-ingest".to_string())
            .spawn(move || gateway.drain_loop())?;
        *slot = Some(handle);
        Ok(())
    }

    fn drain_loop(&self) {
        let timeout = self.config.batch_timeout();
        loop {
            {
                let mut state = self.state.lock();
                if !self.shutdown.load(Ordering::Acquire)
                    && state.queue.len() < self.config.batch_size
                {
                    self.ready.wait_for(&mut state, timeout);
                }
            }
            if self.shutdown.load(Ordering::Acquire) {
                self.flush();
                return;
            }
            self.drain_batch();
        }
    }

    /// Subscribe to the ingress topics and feed them in on a pump thread
    pub fn start_pump(self: &Arc<Self>) -> PatternResult<()> {
        let mut slot = self.pump.lock();
        if slot.is_some() {
            return Ok(());
        }
        let subscription = self
            .bus
            .subscribe_all(&[TOPIC_PATTERN_MATCHED, TOPIC_PATTERNS_EXTRACTED]);
        let gateway = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("patternstore-pump".to_string())
            .spawn(move || {
                while !gateway.pump_stop.load(Ordering::Acquire) {
                    if let Some(n) = subscription.recv_timeout(PUMP_POLL) {
                        gateway.handle_notification(n);
                    }
                }
                for n in subscription.drain() {
                    gateway.handle_notification(n);
                }
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the pump after it has consumed what was already published
    pub fn stop_pump(&self) {
        self.pump_stop.store(true, Ordering::Release);
        if let Some(handle) = self.pump.lock().take() {
            let _ = handle.join();
        }
    }

    /// Stop the pump, drain everything queued and stop the drain worker
    pub fn shutdown(&self) {
        self.stop_pump();
        {
            let _state = self.state.lock();
            self.shutdown.store(true, Ordering::Release);
            self.ready.notify_all();
        }
        match self.drainer.lock().take() {
            Some(handle) => {
                let _ = handle.join();
            }
            None => {
                self.flush();
            }
        }
    }
}
