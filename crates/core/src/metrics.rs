//! Operation counters and timings.
//!
//! Counters are plain atomics updated with `fetch_add`; they are not guarded
//! by the index lock and provide eventually-consistent statistics. Averages
//! are derived at read time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic operation counters and cumulative nanosecond timings.
#[derive(Debug, Default)]
pub struct IndexMetrics {
    inserts: AtomicU64,
    erases: AtomicU64,
    searches: AtomicU64,
    radius_searches: AtomicU64,
    insert_ns: AtomicU64,
    search_ns: AtomicU64,
    radius_search_ns: AtomicU64,
}

/// Point-in-time copy of all counters, for host export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub inserts: u64,
    pub erases: u64,
    pub searches: u64,
    pub radius_searches: u64,
    pub insert_ns: u64,
    pub search_ns: u64,
    pub radius_search_ns: u64,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_insert(&self, elapsed: Duration) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        self.insert_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_erase(&self) {
        self.erases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_search(&self, elapsed: Duration) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.search_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_radius_search(&self, elapsed: Duration) {
        self.radius_searches.fetch_add(1, Ordering::Relaxed);
        self.radius_search_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn insert_count(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    pub fn erase_count(&self) -> u64 {
        self.erases.load(Ordering::Relaxed)
    }

    pub fn search_count(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn radius_search_count(&self) -> u64 {
        self.radius_searches.load(Ordering::Relaxed)
    }

    /// Average insert latency in microseconds, 0.0 before the first insert.
    pub fn avg_insert_micros(&self) -> f64 {
        avg_micros(
            self.insert_ns.load(Ordering::Relaxed),
            self.inserts.load(Ordering::Relaxed),
        )
    }

    /// Average k-NN search latency in microseconds.
    pub fn avg_search_micros(&self) -> f64 {
        avg_micros(
            self.search_ns.load(Ordering::Relaxed),
            self.searches.load(Ordering::Relaxed),
        )
    }

    /// Average radius search latency in microseconds.
    pub fn avg_radius_search_micros(&self) -> f64 {
        avg_micros(
            self.radius_search_ns.load(Ordering::Relaxed),
            self.radius_searches.load(Ordering::Relaxed),
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inserts: self.inserts.load(Ordering::Relaxed),
            erases: self.erases.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            radius_searches: self.radius_searches.load(Ordering::Relaxed),
            insert_ns: self.insert_ns.load(Ordering::Relaxed),
            search_ns: self.search_ns.load(Ordering::Relaxed),
            radius_search_ns: self.radius_search_ns.load(Ordering::Relaxed),
        }
    }
}

fn avg_micros(total_ns: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        (total_ns as f64 / 1_000.0) / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let m = IndexMetrics::new();
        assert_eq!(m.insert_count(), 0);
        assert_eq!(m.search_count(), 0);
        assert_eq!(m.avg_insert_micros(), 0.0);
    }

    #[test]
    fn test_record_insert_accumulates() {
        let m = IndexMetrics::new();
        m.record_insert(Duration::from_micros(10));
        m.record_insert(Duration::from_micros(30));
        assert_eq!(m.insert_count(), 2);
        let avg = m.avg_insert_micros();
        assert!((avg - 20.0).abs() < 1.0, "avg should be ~20us, got {avg}");
    }

    #[test]
    fn test_snapshot_copies_all_counters() {
        let m = IndexMetrics::new();
        m.record_erase();
        m.record_search(Duration::from_nanos(500));
        m.record_radius_search(Duration::from_nanos(700));
        let snap = m.snapshot();
        assert_eq!(snap.erases, 1);
        assert_eq!(snap.searches, 1);
        assert_eq!(snap.radius_searches, 1);
        assert_eq!(snap.search_ns, 500);
        assert_eq!(snap.radius_search_ns, 700);
    }
}
