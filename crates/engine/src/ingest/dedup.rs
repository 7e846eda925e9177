//! Sliding dedup window bounded by age and entry count

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

/// Recently seen fingerprints
///
/// A repeat sighting refreshes the entry's last-seen time. Entries expire
/// after `window`; when more than `max_entries` are live the least recently
/// seen are forgotten first.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    max_entries: usize,
    last_seen: FxHashMap<u64, Instant>,
    /// Sightings in time order; stale when `last_seen` holds a later time
    order: VecDeque<(u64, Instant)>,
}

impl DedupWindow {
    /// Create a window
    pub fn new(window: Duration, max_entries: usize) -> Self {
        DedupWindow {
            window,
            max_entries: max_entries.max(1),
            last_seen: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    /// Live entries
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether no entry is live
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Record a sighting; returns true if `fingerprint` was already live
    pub fn check_and_record(&mut self, fingerprint: u64, now: Instant) -> bool {
        self.expire(now);
        let duplicate = self.last_seen.insert(fingerprint, now).is_some();
        self.order.push_back((fingerprint, now));

        while self.last_seen.len() > self.max_entries {
            if !self.pop_oldest() {
                break;
            }
        }
        if self.order.len() > self.max_entries * 2 {
            self.compact();
        }
        duplicate
    }

    /// Forget a fingerprint so its next sighting is admitted again
    pub fn forget(&mut self, fingerprint: u64) {
        self.last_seen.remove(&fingerprint);
    }

    /// Forget entries older than the window
    pub fn expire(&mut self, now: Instant) {
        while let Some(&(_, seen)) = self.order.front() {
            if now.saturating_duration_since(seen) < self.window {
                break;
            }
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) -> bool {
        match self.order.pop_front() {
            Some((fp, seen)) => {
                if self.last_seen.get(&fp) == Some(&seen) {
                    self.last_seen.remove(&fp);
                }
                true
            }
            None => false,
        }
    }

    /// Drop stale sightings left behind by refreshes
    fn compact(&mut self) {
        let last_seen = &self.last_seen;
        self.order
            .retain(|(fp, seen)| last_seen.get(fp) == Some(seen));
    }
}
