//! Bounded ingestion queue with hysteresis backpressure
//!
//! Normal mode: records are appended FIFO. Reaching `high_water` switches
//! to backpressure mode, where every arrival costs exactly one drop: the
//! lowest-confidence record among the queue and the arrival is discarded
//! (the arrival loses ties). Backpressure ends only once draining brings
//! occupancy below `low_water`.

use std::collections::VecDeque;
use std::time::Instant;

use patternstore_core::PatternMetadata;

/// A record admitted past dedup, waiting to be indexed
#[derive(Debug, Clone)]
pub struct QueuedRecord {
    /// Resolved embedding
    pub vector: Vec<f32>,
    /// Metadata (fingerprint set)
    pub metadata: PatternMetadata,
    /// Admission time
    pub admitted_at: Instant,
}

impl QueuedRecord {
    fn confidence(&self) -> f32 {
        self.metadata.confidence
    }
}

/// Result of pushing one record
#[derive(Debug)]
pub enum Admission {
    /// Appended without displacing anything
    Enqueued,
    /// Backpressure: the arrival itself was discarded
    RejectedIncoming(QueuedRecord),
    /// Backpressure: a queued record was discarded to make room
    Displaced(QueuedRecord),
}

/// Hysteresis queue
#[derive(Debug)]
pub struct IngestQueue {
    items: VecDeque<QueuedRecord>,
    high_water: usize,
    low_water: usize,
    backpressure: bool,
}

impl IngestQueue {
    /// Create a queue; `low_water` must be below `high_water`
    pub fn new(high_water: usize, low_water: usize) -> Self {
        IngestQueue {
            items: VecDeque::with_capacity(high_water.min(4096)),
            high_water: high_water.max(1),
            low_water: low_water.min(high_water.saturating_sub(1)),
            backpressure: false,
        }
    }

    /// Queued records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether backpressure mode is active
    pub fn in_backpressure(&self) -> bool {
        self.backpressure
    }

    /// Admit one record
    pub fn push(&mut self, record: QueuedRecord) -> Admission {
        if !self.backpressure && self.items.len() >= self.high_water {
            self.backpressure = true;
        }
        if !self.backpressure {
            self.items.push_back(record);
            return Admission::Enqueued;
        }

        // First minimum in FIFO order: the oldest of equally weak records goes
        let weakest = self
            .items
            .iter()
            .enumerate()
            .fold(None::<(usize, f32)>, |best, (i, r)| match best {
                Some((_, c)) if c <= r.confidence() => best,
                _ => Some((i, r.confidence())),
            });

        match weakest {
            Some((idx, conf)) if conf < record.confidence() => {
                let displaced = self.items.remove(idx);
                self.items.push_back(record);
                match displaced {
                    Some(d) => Admission::Displaced(d),
                    None => Admission::Enqueued,
                }
            }
            _ => Admission::RejectedIncoming(record),
        }
    }

    /// Take up to `max` records from the front
    pub fn pop_batch(&mut self, max: usize) -> Vec<QueuedRecord> {
        let n = max.min(self.items.len());
        let batch: Vec<QueuedRecord> = self.items.drain(..n).collect();
        if self.backpressure && self.items.len() < self.low_water {
            self.backpressure = false;
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(confidence: f32, tag: &str) -> QueuedRecord {
        QueuedRecord {
            vector: vec![0.0],
            metadata: PatternMetadata::new(confidence, tag, "test"),
            admitted_at: Instant::now(),
        }
    }

    fn sources(q: &mut IngestQueue) -> Vec<String> {
        q.pop_batch(usize::MAX)
            .into_iter()
            .map(|r| r.metadata.source)
            .collect()
    }

    #[test]
    fn test_fifo_below_high_water() {
        let mut q = IngestQueue::new(10, 5);
        for tag in ["a", "b", "c"] {
            assert!(matches!(q.push(rec(0.5, tag)), Admission::Enqueued));
        }
        assert_eq!(sources(&mut q), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_burst_costs_one_drop_per_arrival() {
        let high = 50;
        let mut q = IngestQueue::new(high, 25);
        let mut drops = 0;
        for i in 0..high + 100 {
            match q.push(rec((i % 10) as f32 / 10.0, "s")) {
                Admission::Enqueued => {}
                _ => drops += 1,
            }
            assert!(q.len() <= high);
        }
        assert_eq!(drops, 100);
        assert!(q.in_backpressure());
    }

    #[test]
    fn test_lowest_confidence_is_dropped() {
        let mut q = IngestQueue::new(3, 1);
        q.push(rec(0.5, "a"));
        q.push(rec(0.2, "b"));
        q.push(rec(0.9, "c"));

        match q.push(rec(0.6, "d")) {
            Admission::Displaced(r) => assert_eq!(r.metadata.source, "b"),
            other => panic!("expected displacement, got {:?}", other),
        }
        match q.push(rec(0.1, "e")) {
            Admission::RejectedIncoming(r) => assert_eq!(r.metadata.source, "e"),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(sources(&mut q), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_tie_drops_incoming() {
        let mut q = IngestQueue::new(2, 1);
        q.push(rec(0.5, "a"));
        q.push(rec(0.5, "b"));
        assert!(matches!(q.push(rec(0.5, "c")), Admission::RejectedIncoming(_)));
    }

    #[test]
    fn test_hysteresis() {
        let mut q = IngestQueue::new(10, 4);
        for _ in 0..11 {
            q.push(rec(0.5, "s"));
        }
        assert!(q.in_backpressure());

        q.pop_batch(3); // 7 left, still above low water
        assert!(q.in_backpressure());
        q.push(rec(0.9, "s"));
        assert_eq!(q.len(), 7);

        q.pop_batch(4); // 3 left
        assert!(!q.in_backpressure());
        q.push(rec(0.1, "s"));
        assert_eq!(q.len(), 4);
    }
}
